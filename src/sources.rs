//! Message sources: where scraped `(date, time, speaker, text)` tuples come from.
//!
//! Logging into the site and driving a browser is out of scope; sources read
//! what a scraper already captured:
//!
//! | Kind | Input |
//! |------|-------|
//! | `html` | Saved talk-page HTML snapshots (one file, or a directory of `*.html`) |
//! | `jsonl` | One JSON [`MessageRecord`] per line |
//!
//! # Talk page layout
//!
//! ```text
//! div#container
//!   p.talkDate            "2025/9/24(水)"      ← sets the current date
//!   div
//!     div.talkTime        "06:15既読"
//!     div.talkBalloonColor1  (message from self)
//!     div.talkBalloonColor2  (message from partner)
//! ```
//!
//! Snapshots taken while scrolling overlap, so exact duplicate tuples are
//! removed, keeping the first occurrence.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use convo_sync_core::models::{MessageRecord, Speaker};

use crate::config::SourceConfig;

/// Producer of raw message records for the whole thread.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Short label for logs (e.g. `"html:./snapshots"`).
    fn name(&self) -> String;

    /// Every record currently visible, both speakers, in page order.
    async fn fetch(&self) -> Result<Vec<MessageRecord>>;

    /// Display name of the partner, when the source knows it.
    async fn partner_nickname(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Result of parsing one talk page.
#[derive(Debug, Default)]
pub struct TalkPage {
    pub partner_nickname: Option<String>,
    pub messages: Vec<MessageRecord>,
}

struct TalkSelectors {
    container: Selector,
    time: Selector,
    from_self: Selector,
    from_partner: Selector,
    nickname: Selector,
}

impl TalkSelectors {
    fn new() -> Result<Self> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| anyhow::anyhow!("invalid selector '{}': {:?}", s, e))
        };
        Ok(Self {
            container: parse("div#container")?,
            time: parse("div.talkTime")?,
            from_self: parse("div.talkBalloonColor1")?,
            from_partner: parse("div.talkBalloonColor2")?,
            nickname: parse("div.hover")?,
        })
    }
}

/// Concatenate an element's text nodes, trimming each piece.
fn stripped_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("")
}

fn has_class(el: &ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Parse one talk-page snapshot.
pub fn parse_talk_page(html: &str) -> Result<TalkPage> {
    let selectors = TalkSelectors::new()?;
    let document = Html::parse_document(html);

    let partner_nickname = document
        .select(&selectors.nickname)
        .next()
        .map(|el| stripped_text(&el))
        .filter(|s| !s.is_empty());

    let Some(container) = document.select(&selectors.container).next() else {
        return Ok(TalkPage {
            partner_nickname,
            messages: Vec::new(),
        });
    };

    let mut messages = Vec::new();
    let mut current_date: Option<String> = None;

    for child in container.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "p" if has_class(&child, "talkDate") => {
                current_date = Some(stripped_text(&child));
            }
            "div" => {
                let Some(date) = current_date.as_ref() else {
                    continue;
                };
                let time = child
                    .select(&selectors.time)
                    .next()
                    .map(|t| stripped_text(&t))
                    .unwrap_or_default();

                let balloon = if let Some(el) = child.select(&selectors.from_self).next() {
                    Some((Speaker::Me, el))
                } else {
                    child
                        .select(&selectors.from_partner)
                        .next()
                        .map(|el| (Speaker::Partner, el))
                };

                if let Some((speaker, el)) = balloon {
                    messages.push(MessageRecord::new(
                        date.clone(),
                        time,
                        speaker,
                        stripped_text(&el),
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(TalkPage {
        partner_nickname,
        messages,
    })
}

/// Drop exact duplicates, keeping the first occurrence.
pub fn dedup_records(records: Vec<MessageRecord>) -> Vec<MessageRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.date.clone(),
                r.time.clone(),
                r.speaker,
                r.text.clone(),
            ))
        })
        .collect()
}

/// Reads saved talk-page snapshots.
pub struct HtmlSnapshotSource {
    path: PathBuf,
}

impl HtmlSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            bail!("Snapshot path does not exist: {}", self.path.display());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.path)
            .with_context(|| format!("Failed to list {}", self.path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

}

fn read_snapshot(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))
}

#[async_trait]
impl MessageSource for HtmlSnapshotSource {
    fn name(&self) -> String {
        format!("html:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<MessageRecord>> {
        let mut all = Vec::new();
        for file in self.snapshot_files()? {
            let html = read_snapshot(&file)?;
            let page = parse_talk_page(&html)?;
            if page.messages.is_empty() {
                tracing::warn!(file = %file.display(), "snapshot has no talk container or messages");
            }
            all.extend(page.messages);
        }
        let before = all.len();
        let unique = dedup_records(all);
        tracing::debug!(source = %self.name(), scraped = before, unique = unique.len(), "fetched snapshots");
        Ok(unique)
    }

    /// Nickname shown in the page header of the first snapshot that has one.
    async fn partner_nickname(&self) -> Result<Option<String>> {
        for file in self.snapshot_files()? {
            let html = read_snapshot(&file)?;
            if let Some(name) = parse_talk_page(&html)?.partner_nickname {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

/// Reads a JSONL export, one [`MessageRecord`] per line.
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessageSource for JsonlSource {
    fn name(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<MessageRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: MessageRecord = serde_json::from_str(line).with_context(|| {
                format!("{}:{}: invalid message record", self.path.display(), lineno + 1)
            })?;
            records.push(record);
        }
        Ok(dedup_records(records))
    }
}

pub fn create_source(config: &SourceConfig) -> Result<Arc<dyn MessageSource>> {
    match config.kind.as_str() {
        "html" => Ok(Arc::new(HtmlSnapshotSource::new(&config.path))),
        "jsonl" => Ok(Arc::new(JsonlSource::new(&config.path))),
        other => bail!("Unknown source kind: '{}'. Available: html, jsonl", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: &str = r#"
<html><body>
<div class="hover"> いちご </div>
<div id="container">
  <div>orphan before any date</div>
  <p class="talkDate">2025/9/23(火)</p>
  <div>
    <div class="talkTime">21:00</div>
    <div class="talkBalloonColor2">おやすみなさい🍓</div>
  </div>
  <p class="talkDate">2025/9/24(水)</p>
  <div>
    <div class="talkTime">06:15<span>既読</span></div>
    <div class="talkBalloonColor1">おはよう！<br>今日は晴れ</div>
  </div>
  <div>
    <div class="talkBalloonColor2">no time here</div>
  </div>
  <div><div class="talkTime">07:00</div></div>
</div>
</body></html>
"#;

    #[test]
    fn test_parse_talk_page() {
        let page = parse_talk_page(PAGE).unwrap();
        assert_eq!(page.partner_nickname.as_deref(), Some("いちご"));
        assert_eq!(page.messages.len(), 3);

        let first = &page.messages[0];
        assert_eq!(first.date, "2025/9/23(火)");
        assert_eq!(first.time, "21:00");
        assert_eq!(first.speaker, Speaker::Partner);
        assert_eq!(first.text, "おやすみなさい🍓");

        let second = &page.messages[1];
        assert_eq!(second.speaker, Speaker::Me);
        assert_eq!(second.time, "06:15既読");
        assert_eq!(second.text, "おはよう！今日は晴れ");

        assert_eq!(page.messages[2].time, "");
    }

    #[test]
    fn test_page_without_container() {
        let page = parse_talk_page("<html><body><p>login</p></body></html>").unwrap();
        assert!(page.messages.is_empty());
        assert!(page.partner_nickname.is_none());
    }

    #[test]
    fn test_dedup_keeps_first() {
        let a = MessageRecord::new("d", "t", Speaker::Partner, "x");
        let b = MessageRecord::new("d", "t", Speaker::Me, "x");
        let out = dedup_records(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[tokio::test]
    async fn test_snapshot_dir_merges_overlapping_pages() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("page-01.html"), PAGE).unwrap();
        std::fs::write(tmp.path().join("page-02.html"), PAGE).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let source = HtmlSnapshotSource::new(tmp.path());
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            source.partner_nickname().await.unwrap().as_deref(),
            Some("いちご")
        );
    }

    #[tokio::test]
    async fn test_missing_snapshot_path_errors() {
        let source = HtmlSnapshotSource::new("/definitely/not/here");
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_jsonl_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("thread.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"date":"2025/10/15","time":"10:00","speaker":"partner","text":"こんにちは"}"#,
                "\n\n",
                r#"{"date":"2025/10/15","time":"10:05","speaker":"self","text":"hello"}"#,
                "\n"
            ),
        )
        .unwrap();
        let records = JsonlSource::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].speaker, Speaker::Me);
    }

    #[tokio::test]
    async fn test_jsonl_reports_bad_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("thread.jsonl");
        std::fs::write(&path, "{\"date\":1}\n").unwrap();
        let err = JsonlSource::new(&path).fetch().await.unwrap_err();
        assert!(format!("{:#}", err).contains(":1:"));
    }
}
