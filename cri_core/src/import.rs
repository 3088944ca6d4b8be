//! Question upload from CSV and Excel files

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
#[cfg(feature = "python")]
use pyo3::prelude::*;
use rusqlite::Connection;
use std::path::Path;

use crate::category::Category;
use crate::db::{init_database, load_questions, Question};
use crate::error::{Error, Result};
use crate::student::{reseed_student, student_ids};

/// Separator between options in the choices column
pub const CHOICE_SEPARATOR: char = '|';

/// Outcome of one upload
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSummary {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub imported: usize,
    /// Rows with a prompt but no category or answer
    #[cfg_attr(feature = "python", pyo3(get))]
    pub skipped: usize,
    /// Queue entries appended to existing students
    #[cfg_attr(feature = "python", pyo3(get))]
    pub reseeded: usize,
    /// Students whose re-seed failed. The questions are stored regardless;
    /// re-seeding those students again is the retry, not a second upload.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub reseed_failed: Vec<i64>,
}

/// Column index mapping
#[derive(Debug, Default, Clone)]
pub struct ColumnMapping {
    pub category: usize,
    pub prompt: usize,
    pub answer: usize,
    pub choices: Option<usize>,
    pub image: Option<usize>,
}

/// Detect column indices from header names
fn detect_columns(headers: &[String]) -> Result<ColumnMapping> {
    let mut category = None;
    let mut prompt = None;
    let mut answer = None;
    let mut mapping = ColumnMapping::default();

    for (i, header) in headers.iter().enumerate() {
        match header.to_lowercase().trim() {
            "type" | "category" | "question_type" => category = Some(i),
            "question" | "prompt" => prompt = Some(i),
            "answer" | "correct_answer" => answer = Some(i),
            "choices" | "options" => mapping.choices = Some(i),
            "image" | "image_path" => mapping.image = Some(i),
            _ => {}
        }
    }

    mapping.category = category.ok_or_else(|| Error::Import("missing required 'type' column".to_string()))?;
    mapping.prompt = prompt.ok_or_else(|| Error::Import("missing required 'question' column".to_string()))?;
    mapping.answer = answer.ok_or_else(|| Error::Import("missing required 'answer' column".to_string()))?;
    Ok(mapping)
}

/// Parsed rows plus the number of rows that could not be used
#[derive(Debug, Default)]
pub struct ParsedQuestions {
    pub questions: Vec<Question>,
    pub skipped: usize,
}

impl ParsedQuestions {
    fn push_row(&mut self, mapping: &ColumnMapping, cell: impl Fn(usize) -> String) {
        let prompt = cell(mapping.prompt);
        if prompt.is_empty() {
            return;
        }

        let tag = cell(mapping.category);
        let answer = cell(mapping.answer);
        if tag.is_empty() || answer.is_empty() {
            log::warn!("skipping question without type or answer: {}", prompt);
            self.skipped += 1;
            return;
        }

        let choices = mapping
            .choices
            .map(|i| split_choices(&cell(i)))
            .unwrap_or_default();
        let image = mapping.image.map(&cell).filter(|s| !s.is_empty());

        self.questions.push(Question {
            id: 0,
            category: Category::from_tag(&tag),
            prompt,
            choices,
            answer,
            image,
        });
    }
}

fn split_choices(raw: &str) -> Vec<String> {
    raw.split(CHOICE_SEPARATOR)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read questions from a CSV file with a header row
pub fn read_csv(file_path: &str) -> Result<ParsedQuestions> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(file_path)
        .map_err(|e| Error::Import(format!("failed to open CSV file: {}", e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::Import(format!("failed to read CSV headers: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mapping = detect_columns(&headers)?;

    let mut parsed = ParsedQuestions::default();
    for result in reader.records() {
        let record = result.map_err(|e| Error::Import(format!("failed to read CSV row: {}", e)))?;
        parsed.push_row(&mapping, |i| record.get(i).unwrap_or("").trim().to_string());
    }
    Ok(parsed)
}

/// Read questions from the first sheet of an Excel workbook (`.xlsx` or legacy `.xls`)
pub fn read_excel(file_path: &str) -> Result<ParsedQuestions> {
    let mut workbook = open_workbook_auto(file_path)
        .map_err(|e| Error::Import(format!("failed to open Excel file: {}", e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Import("no sheets found in Excel file".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::Import(format!("failed to read sheet: {}", e)))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| Error::Import("empty file - no header row".to_string()))?;
    let headers: Vec<String> = header_row.iter().map(get_cell_string).collect();
    let mapping = detect_columns(&headers)?;

    let mut parsed = ParsedQuestions::default();
    for row in rows {
        parsed.push_row(&mapping, |i| row.get(i).map(get_cell_string).unwrap_or_default());
    }
    Ok(parsed)
}

/// Add parsed questions to the catalog and queue them for existing students.
///
/// The catalog insert commits before any student is re-seeded. A student
/// whose re-seed fails is listed in `reseed_failed` instead of failing the
/// whole upload, so a retried upload never duplicates the catalog.
pub fn import_questions(conn: &Connection, parsed: ParsedQuestions) -> Result<ImportSummary> {
    let ids = load_questions(conn, &parsed.questions)?;
    let mut summary = ImportSummary {
        imported: ids.len(),
        skipped: parsed.skipped,
        ..Default::default()
    };

    if !ids.is_empty() {
        for student_id in student_ids(conn)? {
            match reseed_student(conn, student_id) {
                Ok(added) => summary.reseeded += added,
                Err(e) => {
                    log::warn!("re-seed failed for student {}: {}", student_id, e);
                    summary.reseed_failed.push(student_id);
                }
            }
        }
    }

    log::info!(
        "imported {} questions ({} skipped), {} queue entries added, {} students not re-seeded",
        summary.imported,
        summary.skipped,
        summary.reseeded,
        summary.reseed_failed.len()
    );
    Ok(summary)
}

/// Parse a CSV or Excel file and load it into the database at `db_path`
pub fn parse_file(file_path: &str, db_path: &str) -> Result<ImportSummary> {
    let extension = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let parsed = match extension.as_str() {
        "xlsx" | "xls" => read_excel(file_path)?,
        "csv" => read_csv(file_path)?,
        _ => return Err(Error::Import(format!("unsupported file format: .{}", extension))),
    };

    let conn = init_database(db_path)?;
    import_questions(&conn, parsed)
}

/// Helper to extract string from Excel cell
fn get_cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
        Data::Empty => String::new(),
    }
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
pub(crate) mod py {
    use super::*;

    #[pyfunction]
    #[pyo3(name = "upload_questions")]
    pub fn py_upload_questions(file_path: &str, db_path: &str) -> PyResult<ImportSummary> {
        Ok(parse_file(file_path, db_path)?)
    }
}
