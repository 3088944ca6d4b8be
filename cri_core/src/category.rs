//! Question category tags

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic a practice question belongs to.
///
/// Content evolves faster than this list, so tags that do not match a known
/// variant are kept as `Unrecognized` instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    SolvingEquationExpression,
    WordProblem,
    LinearFunction,
    SystemOfEquations,
    Inequality,
    Quadratic,
    Geometry,
    DataAnalysis,
    Unrecognized(UnrecognizedTag),
}

/// Normalized tag outside the known list. Only [`Category::from_tag`] builds
/// one, so two spellings of the same tag always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnrecognizedTag(String);

impl UnrecognizedTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Category {
    pub const KNOWN: [Category; 8] = [
        Category::SolvingEquationExpression,
        Category::WordProblem,
        Category::LinearFunction,
        Category::SystemOfEquations,
        Category::Inequality,
        Category::Quadratic,
        Category::Geometry,
        Category::DataAnalysis,
    ];

    /// Parse a tag as it appears in uploads or URLs.
    ///
    /// Matching ignores case and surrounding whitespace, and treats spaces
    /// and hyphens as underscores, so "Word Problem" is `WordProblem`.
    pub fn from_tag(tag: &str) -> Category {
        let normalized: String = tag
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "solving_equation_expression" => Category::SolvingEquationExpression,
            "word_problem" => Category::WordProblem,
            "linear_function" => Category::LinearFunction,
            "system_of_equations" => Category::SystemOfEquations,
            "inequality" => Category::Inequality,
            "quadratic" => Category::Quadratic,
            "geometry" => Category::Geometry,
            "data_analysis" => Category::DataAnalysis,
            _ => Category::Unrecognized(UnrecognizedTag(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::SolvingEquationExpression => "solving_equation_expression",
            Category::WordProblem => "word_problem",
            Category::LinearFunction => "linear_function",
            Category::SystemOfEquations => "system_of_equations",
            Category::Inequality => "inequality",
            Category::Quadratic => "quadratic",
            Category::Geometry => "geometry",
            Category::DataAnalysis => "data_analysis",
            Category::Unrecognized(tag) => tag.as_str(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Category::Unrecognized(_))
    }

    /// True for a tag that was blank after trimming
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        Category::from_tag(&tag)
    }
}

impl From<&str> for Category {
    fn from(tag: &str) -> Self {
        Category::from_tag(tag)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Category::from_tag)
    }
}
