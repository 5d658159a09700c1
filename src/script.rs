use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;

const THEME_PREFIX: &str = "TEMA:";
const SEARCH_PREFIX: &str = "SEARCH:";
const TITLE_PREFIXES: &[&str] = &["TÍTULO:", "TITULO:"];
const HASHTAGS_PREFIX: &str = "HASHTAGS:";
const NARRATION_HEADERS: &[&str] = &["NARRACAO:", "NARRAÇÃO:"];

/// One narration fragment as written in the script, before synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFragment {
    pub sequence_id: u32,
    pub sub_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptFile {
    pub theme: String,
    pub search: Vec<String>,
    pub title: Option<String>,
    pub hashtags: Option<String>,
    /// Comma-separated pieces of each numbered line, in order.
    pub lines: Vec<Vec<String>>,
}

impl ScriptFile {
    pub fn fragments(&self) -> Vec<ScriptFragment> {
        let mut out = Vec::new();
        for (line_idx, pieces) in self.lines.iter().enumerate() {
            for (sub, text) in pieces.iter().enumerate() {
                out.push(ScriptFragment {
                    sequence_id: line_idx as u32 + 1,
                    sub_index: sub as u32,
                    text: text.clone(),
                });
            }
        }
        out
    }

    /// First search query, falling back to the theme.
    pub fn primary_query(&self) -> Option<&str> {
        self.search
            .first()
            .map(String::as_str)
            .or_else(|| (!self.theme.is_empty()).then_some(self.theme.as_str()))
    }

    /// Hashtag words without the leading `#`.
    pub fn tags(&self) -> Vec<String> {
        self.hashtags
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .filter_map(|t| t.strip_prefix('#'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn numbered_line_regex() -> Result<&'static Regex> {
    static NUMBERED_RE: OnceCell<Regex> = OnceCell::new();
    NUMBERED_RE.get_or_try_init(|| {
        Regex::new(r"^\s*\d+\.\s+(.*)$").context("failed to compile numbered line regex")
    })
}

fn strip_any_prefix<'a>(line: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes
        .iter()
        .find_map(|p| line.strip_prefix(p))
        .map(str::trim)
}

pub fn parse_script(content: &str) -> Result<ScriptFile> {
    let numbered = numbered_line_regex()?;
    let mut script = ScriptFile::default();

    for raw in content.lines() {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(THEME_PREFIX) {
            script.theme = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix(SEARCH_PREFIX) {
            let query = rest.trim();
            if !query.is_empty() {
                script.search.push(query.to_string());
            }
        } else if let Some(rest) = strip_any_prefix(trimmed, TITLE_PREFIXES) {
            script.title = (!rest.is_empty()).then(|| rest.to_string());
        } else if let Some(rest) = trimmed.strip_prefix(HASHTAGS_PREFIX) {
            script.hashtags = (!rest.trim().is_empty()).then(|| rest.trim().to_string());
        } else if NARRATION_HEADERS.iter().any(|h| trimmed.starts_with(h)) {
            continue;
        } else if let Some(caps) = numbered.captures(trimmed) {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let pieces: Vec<String> = body.split(',').map(|p| p.trim().to_string()).collect();
            script.lines.push(pieces);
        }
    }

    Ok(script)
}

pub async fn load_script(path: &Path) -> Result<ScriptFile> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read script: {}", path.display()))?;
    parse_script(&content)
}

/// Splits a master script into one block per `TEMA: ` line. Text before the
/// first theme is dropped.
pub fn split_master(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        if line.starts_with("TEMA: ") {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
            current.push(line);
        } else if !current.is_empty() {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        c if c.is_ascii() => c,
        _ => return None,
    };
    Some(folded)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// `"cachoeiras do brasil"` becomes `"CachoeirasDoBrasil"`.
pub fn normalize_name(text: &str) -> String {
    let folded: String = text.chars().filter_map(fold_accent).collect();
    folded
        .split_whitespace()
        .map(|w| {
            let cleaned: String = w
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            capitalize(&cleaned)
        })
        .collect()
}

/// File name for a block, from the text after `TEMA: ` up to the next `:`.
pub fn theme_file_name(block: &str) -> String {
    let theme = block
        .lines()
        .find_map(|l| l.strip_prefix("TEMA: "))
        .and_then(|rest| rest.split(':').next())
        .map(str::trim)
        .unwrap_or("");
    let name = normalize_name(theme);
    if name.is_empty() {
        "Roteiro.txt".to_string()
    } else {
        format!("{}.txt", name)
    }
}

fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name.trim_end_matches(".txt");
    let mut n = 2;
    loop {
        let path = dir.join(format!("{}_{}.txt", stem, n));
        if !path.exists() {
            return path;
        }
        n += 1;
    }
}

/// Writes each theme block of `master` into `out_dir` and removes `master`.
/// A master without any theme is left untouched.
pub async fn split_master_file(master: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(master)
        .await
        .with_context(|| format!("read master script: {}", master.display()))?;
    let blocks = split_master(&content);
    if blocks.is_empty() {
        logw(format!("No 'TEMA: ' blocks in {}; leaving it in place", master.display()));
        return Ok(Vec::new());
    }

    fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("create scripts dir: {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let path = unique_path(out_dir, &theme_file_name(block));
        fs::write(&path, block.as_bytes())
            .await
            .with_context(|| format!("write script: {}", path.display()))?;
        logi(format!("Script created: {}", path.display()));
        written.push(path);
    }

    match fs::remove_file(master).await {
        Ok(()) => logok(format!("Removed master script {}", master.display())),
        Err(err) => logw(format!("Could not remove {}: {}", master.display(), err)),
    }
    Ok(written)
}

/// Master scripts waiting to be split: `roteiro.txt` or `*.roteiro.txt`.
pub fn is_master_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            let lower = n.to_ascii_lowercase();
            lower == "roteiro.txt" || lower.ends_with(".roteiro.txt")
        })
        .unwrap_or(false)
}
