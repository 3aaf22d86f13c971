//! In-place editing of ini-style application configuration.
//!
//! The system under test reads an ini file (`[section]` headers, `key = value`
//! lines). Each scenario copies a base config and layers its own overrides on
//! top before the environment is built.
//!
//! Not safe for concurrent writers to the same file. Each scenario owns its
//! generated config file exclusively, so writes never need a lock.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use common::error::{HarnessError, Result};

/// One (section, key, value) override applied to a rendered config file.
///
/// Append-or-replace: setting the same (section, key) twice keeps a single
/// entry with the last value; targeting an absent section creates it.
#[derive(Debug, Clone)]
pub struct ConfigOverride {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigOverride {
    pub fn new(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct Document {
    sections: Vec<Section>,
}

impl Document {
    /// Parse ini text. An empty document is valid and has zero sections.
    /// Comment lines and anything before the first section header are skipped.
    fn parse(text: &str) -> Self {
        let mut doc = Document::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                doc.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
            } else if let Some(section) = doc.sections.last_mut() {
                if let Some((key, value)) = line.split_once('=') {
                    section
                        .entries
                        .push((key.trim().to_string(), value.trim().to_string()));
                } else {
                    // value-less key, kept as an empty value
                    section.entries.push((line.to_string(), String::new()));
                }
            }
        }
        doc
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        if let Some(i) = self.sections.iter().position(|s| s.name == name) {
            &mut self.sections[i]
        } else {
            self.sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            let last = self.sections.len() - 1;
            &mut self.sections[last]
        }
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `[section]` then `key = value` lines, blank line after every section.
    fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.entries {
                let _ = writeln!(out, "{key} = {value}");
            }
            out.push('\n');
        }
        out
    }
}

/// Editor for one ini file on disk.
#[derive(Debug, Clone)]
pub struct IniFile {
    path: PathBuf,
}

impl IniFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set `key` to `value` in `section`, creating the section if absent,
    /// then rewrite the file atomically.
    ///
    /// # Errors
    ///
    /// Returns an i/o error if the file cannot be read or replaced.
    pub fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut doc = self.read()?;
        doc.section_mut(section).set(key, value);
        self.write(&doc)
    }

    /// Apply every override in order.
    ///
    /// # Errors
    ///
    /// Fails on the first override that cannot be persisted.
    pub fn apply(&self, overrides: &[ConfigOverride]) -> Result<()> {
        for o in overrides {
            self.set(&o.section, &o.key, &o.value)?;
        }
        Ok(())
    }

    /// Read a single value.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::KeyNotFound` if the section or key is absent.
    pub fn get(&self, section: &str, key: &str) -> Result<String> {
        let doc = self.read()?;
        doc.get(section, key)
            .map(ToString::to_string)
            .ok_or_else(|| HarnessError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Read a single value and parse it as an integer.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` if absent, `Configuration` if the value is not an
    /// integer.
    pub fn get_int(&self, section: &str, key: &str) -> Result<i64> {
        let raw = self.get(section, key)?;
        raw.parse().map_err(|_| {
            HarnessError::Configuration(format!(
                "[{section}] {key} is not an integer: {raw:?}"
            ))
        })
    }

    /// Missing and empty files both read as a document with zero sections.
    fn read(&self) -> Result<Document> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Document::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a temp file in the same directory, then rename over the
    /// target so readers never observe a half-written config.
    fn write(&self, doc: &Document) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(doc.render().as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| HarnessError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file() -> (tempfile::TempDir, IniFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ini = IniFile::new(dir.path().join("zone.conf"));
        (dir, ini)
    }

    fn contents(ini: &IniFile) -> String {
        std::fs::read_to_string(ini.path()).expect("read back")
    }

    #[test]
    fn set_into_missing_file_creates_section() {
        let (_dir, ini) = scratch_file();
        ini.set("hello", "mykey", "12345").unwrap();
        assert_eq!(contents(&ini), "[hello]\nmykey = 12345\n\n");
    }

    #[test]
    fn set_replaces_existing_key_without_duplication() {
        let (_dir, ini) = scratch_file();
        ini.set("hello", "mykey", "12345").unwrap();
        ini.set("hello", "mykey", "45678").unwrap();
        assert_eq!(contents(&ini), "[hello]\nmykey = 45678\n\n");
    }

    #[test]
    fn sections_accumulate_in_order() {
        let (_dir, ini) = scratch_file();
        ini.set("hello", "mykey", "45678").unwrap();
        ini.set("hello", "otherkey", "\"abcde\"").unwrap();
        ini.set("goodbye", "mykey", "").unwrap();
        assert_eq!(
            contents(&ini),
            "[hello]\nmykey = 45678\notherkey = \"abcde\"\n\n[goodbye]\nmykey = \n\n"
        );

        ini.set("goodbye", "mykey", "value").unwrap();
        ini.set("goodbye", "yellow", "1").unwrap();
        assert_eq!(
            contents(&ini),
            "[hello]\nmykey = 45678\notherkey = \"abcde\"\n\n\
             [goodbye]\nmykey = value\nyellow = 1\n\n"
        );
    }

    #[test]
    fn get_returns_last_set_value() {
        let (_dir, ini) = scratch_file();
        ini.set("service:worker", "threshold_percentage", "49").unwrap();
        assert_eq!(ini.get("service:worker", "threshold_percentage").unwrap(), "49");
        assert_eq!(ini.get_int("service:worker", "threshold_percentage").unwrap(), 49);
    }

    #[test]
    fn get_missing_key_is_key_not_found() {
        let (_dir, ini) = scratch_file();
        ini.set("present", "here", "1").unwrap();
        let err = ini.get("present", "absent").unwrap_err();
        assert!(matches!(err, HarnessError::KeyNotFound { .. }));
        let err = ini.get("absent", "whatever").unwrap_err();
        assert!(matches!(err, HarnessError::KeyNotFound { .. }));
    }

    #[test]
    fn get_int_rejects_non_numeric() {
        let (_dir, ini) = scratch_file();
        ini.set("DEFAULT", "quota_zones", "lots").unwrap();
        let err = ini.get_int("DEFAULT", "quota_zones").unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn empty_file_is_a_valid_document() {
        let (_dir, ini) = scratch_file();
        std::fs::write(ini.path(), "").unwrap();
        ini.set("DEFAULT", "quota_zones", "3").unwrap();
        assert_eq!(contents(&ini), "[DEFAULT]\nquota_zones = 3\n\n");
    }

    #[test]
    fn unrelated_keys_survive_edits() {
        let (_dir, ini) = scratch_file();
        std::fs::write(
            ini.path(),
            "[storage]\nconnection = mysql://db/zones\n\n[service:worker]\nthreads = 4\n\n",
        )
        .unwrap();
        ini.set("service:worker", "threshold_percentage", "49").unwrap();
        assert_eq!(
            contents(&ini),
            "[storage]\nconnection = mysql://db/zones\n\n\
             [service:worker]\nthreads = 4\nthreshold_percentage = 49\n\n"
        );
    }

    #[test]
    fn apply_layers_overrides_in_order() {
        let (_dir, ini) = scratch_file();
        ini.apply(&[
            ConfigOverride::new("DEFAULT", "quota_zones", "3"),
            ConfigOverride::new("DEFAULT", "quota_zones", "5"),
            ConfigOverride::new("service:worker", "threshold_percentage", "49"),
        ])
        .unwrap();
        assert_eq!(ini.get_int("DEFAULT", "quota_zones").unwrap(), 5);
        assert_eq!(ini.get_int("service:worker", "threshold_percentage").unwrap(), 49);
    }
}
