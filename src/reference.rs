// 📚 Reference tables - side tables joined into LEI records
//
// Three read-only lookups built once before streaming starts:
// - ELF code      → localized legal form name
// - LEI           → SWIFT BIC codes
// - LEI           → ISIN codes
//
// Each loader fails loudly on a broken contract (missing source, missing
// LEI column/field) instead of returning a partial mapping.

use crate::error::LoaderError;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

// ============================================================================
// TABLE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    LegalForms,
    Bic,
    Isin,
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::LegalForms => "legal form",
            TableKind::Bic => "BIC",
            TableKind::Isin => "ISIN",
        }
    }

    /// Filename prefix of the extracted download in a data directory
    ///
    /// GLEIF names carry the publication date, e.g.
    /// `2021-10-21-elf-code-list-v1.4.1.csv`, `lei-bic-20220429.csv`,
    /// `isin-lei-20220518.csv`.
    pub fn file_marker(&self) -> &'static str {
        match self {
            TableKind::LegalForms => "elf-code-list",
            TableKind::Bic => "lei-bic",
            TableKind::Isin => "isin-lei",
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// LOOKUP TABLES
// ============================================================================

/// ELF code → localized legal form name
#[derive(Debug, Clone, Default)]
pub struct LegalForms {
    names: HashMap<String, String>,
}

impl LegalForms {
    /// Build from (code, name) rows. Blank names are skipped; the first
    /// non-blank name for a code wins.
    pub fn from_rows<I, C, N>(rows: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: AsRef<str>,
    {
        let mut names = HashMap::new();
        for (code, name) in rows {
            let code = code.as_ref().trim();
            let name = name.as_ref().trim();
            if code.is_empty() || name.is_empty() {
                continue;
            }
            names
                .entry(code.to_string())
                .or_insert_with(|| name.to_string());
        }
        LegalForms { names }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// LEI → codes (BIC or ISIN), duplicates and file order preserved
#[derive(Debug, Clone, Default)]
pub struct CodeMap {
    codes: HashMap<String, Vec<String>>,
}

impl CodeMap {
    /// Build from (LEI, code) rows; a blank code still registers the LEI
    pub fn from_rows<I, L, C>(rows: I) -> Self
    where
        I: IntoIterator<Item = (L, Option<C>)>,
        L: AsRef<str>,
        C: AsRef<str>,
    {
        let mut codes: HashMap<String, Vec<String>> = HashMap::new();
        for (lei, code) in rows {
            let entry = codes.entry(lei.as_ref().trim().to_string()).or_default();
            if let Some(code) = code {
                let code = code.as_ref().trim();
                if !code.is_empty() {
                    entry.push(code.to_string());
                }
            }
        }
        CodeMap { codes }
    }

    /// Codes for a LEI; an unknown LEI is simply empty
    pub fn get(&self, lei: &str) -> &[String] {
        self.codes.get(lei).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct LEIs
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The three tables the entity mapper joins against
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub legal_forms: LegalForms,
    pub bics: CodeMap,
    pub isins: CodeMap,
}

impl ReferenceTables {
    pub fn new(legal_forms: LegalForms, bics: CodeMap, isins: CodeMap) -> Self {
        ReferenceTables {
            legal_forms,
            bics,
            isins,
        }
    }

    /// No enrichment; relationship files and tests use this
    pub fn empty() -> Self {
        ReferenceTables::default()
    }

    /// Locate and load all three tables
    pub fn load(locator: &dyn SourceLocator) -> Result<Self, LoaderError> {
        let legal_forms = load_legal_forms(open(locator, TableKind::LegalForms)?)?;
        tracing::info!(codes = legal_forms.len(), "loaded legal form codes");

        let bics = load_bic_mapping(open(locator, TableKind::Bic)?)?;
        tracing::info!(leis = bics.len(), "loaded BIC mapping");

        let isins = load_isin_mapping(open(locator, TableKind::Isin)?)?;
        tracing::info!(leis = isins.len(), "loaded ISIN mapping");

        Ok(ReferenceTables::new(legal_forms, bics, isins))
    }
}

fn open(locator: &dyn SourceLocator, table: TableKind) -> Result<File, LoaderError> {
    let path = locator.locate(table)?;
    tracing::debug!(table = %table, path = %path.display(), "opening reference table");
    Ok(File::open(&path)?)
}

// ============================================================================
// CSV LOADERS
// ============================================================================

const ELF_CODE_COLUMN: &str = "ELF Code";
const ELF_NAME_COLUMN: &str = "Entity Legal Form name Local name";

/// ELF code list CSV → LegalForms
pub fn load_legal_forms<R: Read>(reader: R) -> Result<LegalForms, LoaderError> {
    let table = TableKind::LegalForms;
    let mut rdr = csv_reader(reader);
    let headers = read_headers(&mut rdr, table)?;
    let code_idx = column(&headers, ELF_CODE_COLUMN, table)?;
    let name_idx = column(&headers, ELF_NAME_COLUMN, table)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|source| LoaderError::Csv { table, source })?;
        let code = record.get(code_idx).unwrap_or("").to_string();
        let name = record.get(name_idx).unwrap_or("").to_string();
        rows.push((code, name));
    }

    Ok(LegalForms::from_rows(rows))
}

/// LEI-BIC mapping CSV → CodeMap
pub fn load_bic_mapping<R: Read>(reader: R) -> Result<CodeMap, LoaderError> {
    load_code_map(reader, TableKind::Bic, "BIC")
}

/// ISIN-LEI mapping CSV (already extracted from its ZIP) → CodeMap
pub fn load_isin_mapping<R: Read>(reader: R) -> Result<CodeMap, LoaderError> {
    load_code_map(reader, TableKind::Isin, "ISIN")
}

fn load_code_map<R: Read>(
    reader: R,
    table: TableKind,
    code_column: &'static str,
) -> Result<CodeMap, LoaderError> {
    let mut rdr = csv_reader(reader);
    let headers = read_headers(&mut rdr, table)?;
    let lei_idx = column(&headers, "LEI", table)?;
    let code_idx = column(&headers, code_column, table)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|source| LoaderError::Csv { table, source })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let lei = match record.get(lei_idx).map(str::trim) {
            Some(lei) if !lei.is_empty() => lei.to_string(),
            _ => return Err(LoaderError::MissingLei { table, line }),
        };
        let code = record.get(code_idx).map(str::to_string);
        rows.push((lei, code));
    }

    Ok(CodeMap::from_rows(rows))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

fn read_headers<R: Read>(
    rdr: &mut csv::Reader<R>,
    table: TableKind,
) -> Result<Vec<String>, LoaderError> {
    let headers = rdr
        .headers()
        .map_err(|source| LoaderError::Csv { table, source })?;
    Ok(headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect())
}

fn column(headers: &[String], name: &'static str, table: TableKind) -> Result<usize, LoaderError> {
    let wanted = name.to_lowercase();
    headers
        .iter()
        .position(|h| *h == wanted)
        .ok_or(LoaderError::MissingColumn { table, column: name })
}

// ============================================================================
// SOURCE LOCATION
// ============================================================================

/// Finds the current source file of a reference table
///
/// Stands in for the download-link discovery step: implementations
/// return a readable local path or `LoaderError::SourceNotFound`.
pub trait SourceLocator {
    fn locate(&self, table: TableKind) -> Result<PathBuf, LoaderError>;
}

/// Looks for extracted downloads in one directory
///
/// Picks the lexicographically greatest `.csv` whose name contains the
/// table's marker, i.e. the newest publication date.
pub struct DirectoryLocator {
    dir: PathBuf,
}

impl DirectoryLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryLocator { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest file whose lowercase name contains `marker` and ends in `suffix`
    pub fn newest(&self, marker: &str, suffix: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.dir).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| {
                        let lower = n.to_lowercase();
                        lower.contains(marker) && lower.ends_with(suffix)
                    })
                    .unwrap_or(false)
            })
            .max()
    }
}

impl SourceLocator for DirectoryLocator {
    fn locate(&self, table: TableKind) -> Result<PathBuf, LoaderError> {
        self.newest(table.file_marker(), ".csv")
            .ok_or_else(|| LoaderError::SourceNotFound {
                table,
                location: self.dir.display().to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
