//! Streaming patch parser.
//!
//! The model's response is a growing text buffer mixing prose, fenced file
//! blocks and (at the very end) a fenced `json` block listing the
//! authoritative file operations:
//!
//! ````text
//! Here is a button.
//! ```html
//! <!-- /index.html -->
//! <button>Hi</button>
//! ```
//! ```json
//! {"files": [{"action": "update", "path": "/index.html", "type": "html", "content": "..."}]}
//! ```
//! ````
//!
//! Every derived view is recomputed from the whole buffer on each call.
//! Nothing is remembered between calls, so the same buffer always yields the
//! same views, and no input can make the scan fail.

use std::ops::Range;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;

use super::sanitize::strip_trailing_commas;
use crate::error::{Error, Result};
use crate::patch::{self, RawOperation, StreamOperation};
use crate::vfs::{FileType, VfsPath};

/// Comment forms accepted on the first line of a file block:
/// `<!-- /x -->`, `/* /x */` and `// /x`.
static PATH_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:<!--(?P<html>.*?)-->|/\*(?P<block>.*?)\*/|//(?P<line>.*))\s*$")
        .expect("path comment pattern is valid")
});

/// A `/`-rooted path token inside the comment body. `//host` (scheme-relative
/// URLs) and `https://...` never match.
static ROOTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(/[^/\s*<>"'`][^\s*<>"'`]*)"#).expect("rooted path pattern is valid")
});

/// A fully closed file block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: VfsPath,
    pub language: String,
    pub content: String,
}

/// The file block currently being generated (its fence is still open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveBlock {
    pub current_file: VfsPath,
    pub language: String,
    pub current_code: String,
}

/// Everything the chat consumer renders while the stream is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamView {
    pub completed_blocks: Vec<FileBlock>,
    pub live_block: Option<LiveBlock>,
    /// The buffer with every file block, the live block and the operations
    /// block removed.
    pub narrative: String,
}

/// Parser over a single growing response buffer.
#[derive(Debug, Clone)]
pub struct StreamingPatchParser {
    full_text: String,
    max_bytes: usize,
    truncated: bool,
}

impl StreamingPatchParser {
    /// New parser that stops growing its buffer at `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            full_text: String::new(),
            max_bytes,
            truncated: false,
        }
    }

    /// Append a chunk. Returns `false` (and drops the chunk) once the buffer
    /// limit has been reached; every later chunk is dropped too.
    pub fn push(&mut self, chunk: &str) -> bool {
        if self.truncated {
            return false;
        }
        if self.full_text.len() + chunk.len() > self.max_bytes {
            warn!(
                "response exceeded {} bytes; ignoring the rest of the stream",
                self.max_bytes
            );
            self.truncated = true;
            return false;
        }
        self.full_text.push_str(chunk);
        true
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Derived views for the current buffer.
    pub fn view(&self) -> StreamView {
        scan(&self.full_text)
    }

    /// Final operation list for the complete buffer.
    ///
    /// `StreamTruncated` once the limit was hit: the operations block may be
    /// among the dropped chunks, so the kept prefix is never applied.
    pub fn final_operations(&self) -> Result<Vec<StreamOperation>> {
        if self.truncated {
            return Err(Error::StreamTruncated {
                limit: self.max_bytes,
            });
        }
        final_operations(&self.full_text)
    }
}

/// What a fenced block turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockKind {
    /// Opens with a path comment.
    File { path: VfsPath, content: String },
    /// Tagged `json` without a path comment: an operations block candidate.
    Json,
    /// Ordinary code shown as part of the prose.
    Other,
    /// Still open and too short to classify.
    Pending,
}

#[derive(Debug, Clone)]
struct Fence<'a> {
    /// Byte range of the whole block, fences included.
    span: Range<usize>,
    language: String,
    body: &'a str,
    closed: bool,
    kind: BlockKind,
}

/// Compute every derived view for `full_text`.
pub fn scan(full_text: &str) -> StreamView {
    let fences = fences(full_text);
    let ops_block = operations_block(&fences);

    let completed_blocks = fences
        .iter()
        .filter(|f| f.closed)
        .filter_map(|f| match &f.kind {
            BlockKind::File { path, content } => Some(FileBlock {
                path: path.clone(),
                language: f.language.clone(),
                content: content.clone(),
            }),
            _ => None,
        })
        .collect();

    let live_block = fences.last().and_then(|f| match &f.kind {
        BlockKind::File { path, content } if !f.closed && f.language != "json" => Some(LiveBlock {
            current_file: path.clone(),
            language: f.language.clone(),
            current_code: content.clone(),
        }),
        _ => None,
    });

    let hidden: Vec<Range<usize>> = fences
        .iter()
        .enumerate()
        .filter(|(i, f)| {
            matches!(f.kind, BlockKind::File { .. } | BlockKind::Pending) || Some(*i) == ops_block
        })
        .map(|(_, f)| f.span.clone())
        .collect();

    StreamView {
        completed_blocks,
        live_block,
        narrative: narrative(full_text, &hidden),
    }
}

/// Extract the operation list from a complete response.
///
/// Uses the last `json` block when there is one; otherwise every completed
/// file block becomes an implicit `update`. Pure prose yields an empty list.
/// A `json` block that does not parse even after trailing-comma repair is a
/// `MalformedPatch` carrying the block's original text.
pub fn final_operations(full_text: &str) -> Result<Vec<StreamOperation>> {
    let fences = fences(full_text);

    if let Some(index) = operations_block(&fences) {
        let raw_text = fences[index].body;
        let raw_ops = parse_operations(raw_text)?;
        debug!("operations block holds {} operation(s)", raw_ops.len());
        return Ok(patch::validate(raw_ops));
    }

    let implicit: Vec<StreamOperation> = fences
        .iter()
        .filter(|f| f.closed)
        .filter_map(|f| match &f.kind {
            BlockKind::File { path, content } => Some(StreamOperation::update(
                path.clone(),
                FileType::for_block(&f.language, path),
                content.clone(),
            )),
            _ => None,
        })
        .collect();
    debug!("no operations block; {} file block(s) become updates", implicit.len());
    Ok(implicit)
}

/// Wire payload: `{"files": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Wrapped {
        #[serde(alias = "operations")]
        files: Vec<RawOperation>,
    },
    Bare(Vec<RawOperation>),
}

fn parse_operations(raw_text: &str) -> Result<Vec<RawOperation>> {
    let sanitized = strip_trailing_commas(raw_text.trim());
    match serde_json::from_str::<Payload>(&sanitized) {
        Ok(Payload::Wrapped { files }) | Ok(Payload::Bare(files)) => Ok(files),
        Err(e) => {
            // Untagged enums hide the position; re-parse as a value for a useful reason.
            let reason = match serde_json::from_str::<serde_json::Value>(&sanitized) {
                Err(inner) => inner.to_string(),
                Ok(_) => format!("unexpected operation list shape: {}", e),
            };
            warn!("malformed operations block: {}", reason);
            Err(Error::MalformedPatch {
                raw: raw_text.to_string(),
                reason,
            })
        }
    }
}

/// Index of the last `json` block that is not itself a file block.
fn operations_block(fences: &[Fence<'_>]) -> Option<usize> {
    fences.iter().rposition(|f| f.kind == BlockKind::Json)
}

/// A block whose closing fence has not been seen yet.
struct OpenFence {
    start: usize,
    body_start: usize,
    ticks: usize,
    language: String,
    /// Inside a fenced example nested in a markdown file.
    nested: bool,
}

impl OpenFence {
    /// Feed one trimmed line; true if it closes the block.
    ///
    /// Markdown bodies may carry their own fenced examples: a fence line with
    /// an info string opens a nested example and the next bare run closes it.
    fn closes_at(&mut self, line: &str) -> bool {
        let ticks = line.chars().take_while(|c| *c == '`').count();
        let bare = ticks >= 3 && ticks == line.len();
        if matches!(self.language.as_str(), "md" | "markdown") {
            if self.nested {
                if bare {
                    self.nested = false;
                }
                return false;
            }
            if ticks >= 3 && !bare && !line[ticks..].contains('`') {
                self.nested = true;
                return false;
            }
        }
        bare && ticks >= self.ticks
    }

    fn finish<'a>(self, text: &'a str, end: Option<(usize, usize)>) -> Fence<'a> {
        let (body, span_end, closed) = match end {
            Some((line_start, line_end)) => (&text[self.body_start..line_start], line_end, true),
            None => (&text[self.body_start..], text.len(), false),
        };
        Fence {
            span: self.start..span_end,
            kind: classify(&self.language, body, closed),
            language: self.language,
            body,
            closed,
        }
    }
}

/// Split `text` into fenced blocks.
///
/// A fence is a line whose first non-blank characters are three or more
/// backticks; a backtick run later on the same line makes it an inline span
/// instead. A block closes at a line holding only a backtick run at least as
/// long as the opener. The final block may be left open.
fn fences(text: &str) -> Vec<Fence<'_>> {
    let mut fences = Vec::new();
    let mut open: Option<OpenFence> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']).trim_start();

        if let Some(block) = open.as_mut() {
            if block.closes_at(content.trim_end())
                && let Some(block) = open.take()
            {
                fences.push(block.finish(text, Some((line_start, offset))));
            }
            continue;
        }

        let ticks = content.chars().take_while(|c| *c == '`').count();
        if ticks < 3 {
            continue;
        }
        let info = &content[ticks..];
        if info.contains('`') {
            continue;
        }
        let language = info
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if line.ends_with('\n') {
            open = Some(OpenFence {
                start: line_start,
                body_start: offset,
                ticks,
                language,
                nested: false,
            });
        } else {
            // Opening line still streaming in.
            fences.push(Fence {
                span: line_start..text.len(),
                language,
                body: "",
                closed: false,
                kind: BlockKind::Pending,
            });
        }
    }

    if let Some(block) = open {
        fences.push(block.finish(text, None));
    }
    fences
}

fn classify(language: &str, body: &str, closed: bool) -> BlockKind {
    let (first_line, rest) = match body.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (body, None),
    };
    // An open block whose first line is still arriving cannot be told apart yet.
    if !closed && rest.is_none() {
        return BlockKind::Pending;
    }

    if let Some(path) = path_from_comment(first_line) {
        let rest = rest.unwrap_or_default();
        let content = if closed {
            rest.strip_suffix('\n').unwrap_or(rest)
        } else {
            without_partial_fence(rest)
        };
        return BlockKind::File {
            path,
            content: content.strip_suffix('\r').unwrap_or(content).to_string(),
        };
    }

    if language == "json" {
        BlockKind::Json
    } else {
        BlockKind::Other
    }
}

/// The `/`-rooted path inside a leading comment line, if it is a valid path.
fn path_from_comment(line: &str) -> Option<VfsPath> {
    let captures = PATH_COMMENT.captures(line)?;
    let inner = captures
        .name("html")
        .or_else(|| captures.name("block"))
        .or_else(|| captures.name("line"))?
        .as_str();
    let token = ROOTED_PATH.captures(inner)?.get(1)?.as_str();
    let path = VfsPath::new(token).ok()?;
    if path.is_root() { None } else { Some(path) }
}

/// Drop a trailing line that is only the start of a closing fence.
fn without_partial_fence(code: &str) -> &str {
    let last_line_start = code.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let last_line = code[last_line_start..].trim();
    if !last_line.is_empty() && last_line.chars().all(|c| c == '`') {
        code[..last_line_start].strip_suffix('\n').unwrap_or(&code[..last_line_start])
    } else {
        code
    }
}

/// `text` minus the hidden ranges, with blank-line runs collapsed and the
/// ends trimmed.
fn narrative(text: &str, hidden: &[Range<usize>]) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in hidden {
        kept.push_str(&text[cursor..range.start]);
        cursor = range.end;
    }
    kept.push_str(&text[cursor..]);

    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in kept.lines() {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(line);
        previous_blank = blank;
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Action;

    const SCENARIO: &str = "Here is a button.\n```html\n<!-- /index.html -->\n<button>Hi</button>\n```\nRingkasan: done.\n```json\n{\"files\":[{\"action\":\"update\",\"path\":\"/index.html\",\"type\":\"html\",\"content\":\"<button>Hi</button>\"}]}\n```";

    fn p(path: &str) -> VfsPath {
        VfsPath::new(path).unwrap()
    }

    #[test]
    fn test_scenario_views() {
        let view = scan(SCENARIO);
        assert_eq!(
            view.completed_blocks,
            vec![FileBlock {
                path: p("/index.html"),
                language: "html".to_string(),
                content: "<button>Hi</button>".to_string(),
            }]
        );
        assert_eq!(view.narrative, "Here is a button.\nRingkasan: done.");
        assert!(view.live_block.is_none());
    }

    #[test]
    fn test_scenario_operations() {
        let ops = final_operations(SCENARIO).unwrap();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            StreamOperation::Write {
                action,
                path,
                file_type,
                content,
            } => {
                assert_eq!(*action, Action::Update);
                assert_eq!(path, &p("/index.html"));
                assert_eq!(*file_type, FileType::Html);
                assert_eq!(content, "<button>Hi</button>");
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_rescan_is_idempotent() {
        for end in 0..=SCENARIO.len() {
            if !SCENARIO.is_char_boundary(end) {
                continue;
            }
            let prefix = &SCENARIO[..end];
            assert_eq!(scan(prefix), scan(prefix));
        }
    }

    #[test]
    fn test_every_prefix_scans_without_raw_file_content() {
        for end in 0..=SCENARIO.len() {
            let view = scan(&SCENARIO[..end]);
            assert!(!view.narrative.contains("<button>"), "prefix {}", end);
            assert!(!view.narrative.contains("\"files\""), "prefix {}", end);
        }
    }

    #[test]
    fn test_live_block_tracks_open_fence() {
        let text = "Working on it.\n```css\n/* /css/site.css */\nbody {\n  color: red;";
        let view = scan(text);
        let live = view.live_block.unwrap();
        assert_eq!(live.current_file, p("/css/site.css"));
        assert_eq!(live.language, "css");
        assert_eq!(live.current_code, "body {\n  color: red;");
        assert!(view.completed_blocks.is_empty());
        assert_eq!(view.narrative, "Working on it.");
    }

    #[test]
    fn test_live_block_ignores_partial_closing_fence() {
        let text = "```js\n// /app.js\nconsole.log(1);\n``";
        let live = scan(text).live_block.unwrap();
        assert_eq!(live.current_code, "console.log(1);");
    }

    #[test]
    fn test_live_block_waits_for_complete_path_line() {
        let view = scan("Intro\n```js\n// /src/ap");
        assert!(view.live_block.is_none());
        assert_eq!(view.narrative, "Intro");
        let view = scan("Intro\n```js\n// /src/app.js\n");
        assert_eq!(view.live_block.unwrap().current_file, p("/src/app.js"));
    }

    #[test]
    fn test_open_json_block_is_not_live() {
        let view = scan("Done.\n```json\n{\"files\": [");
        assert!(view.live_block.is_none());
        assert_eq!(view.narrative, "Done.");
    }

    #[test]
    fn test_non_file_code_stays_in_narrative() {
        let text = "Run this:\n```bash\nnpm install\n```\nThen reload.";
        let view = scan(text);
        assert!(view.completed_blocks.is_empty());
        assert_eq!(view.narrative, "Run this:\n```bash\nnpm install\n```\nThen reload.");
        assert!(final_operations(text).unwrap().is_empty());
    }

    #[test]
    fn test_inline_backticks_do_not_open_fences() {
        let text = "Use `x` and ```inline``` here.\n```html\n<!-- /a.html -->\n<p>a</p>\n```\n";
        let view = scan(text);
        assert_eq!(view.completed_blocks.len(), 1);
        assert_eq!(view.narrative, "Use `x` and ```inline``` here.");
    }

    #[test]
    fn test_comment_syntaxes() {
        for first in ["<!-- /a.txt -->", "/* /a.txt */", "// /a.txt", "<!-- File: /a.txt -->"] {
            let text = format!("```\n{}\nbody\n```\n", first);
            let view = scan(&text);
            assert_eq!(view.completed_blocks.len(), 1, "{}", first);
            assert_eq!(view.completed_blocks[0].path, p("/a.txt"));
            assert_eq!(view.completed_blocks[0].content, "body");
        }
    }

    #[test]
    fn test_block_without_path_comment_is_not_a_file() {
        let text = "```js\nconsole.log('x');\n```\n";
        assert!(scan(text).completed_blocks.is_empty());
        let url = "```js\n// https://example.com/x.js\n```\n";
        assert!(scan(url).completed_blocks.is_empty());
    }

    #[test]
    fn test_fallback_to_file_blocks_without_json() {
        let text = "```html\n<!-- /index.html -->\n<p>x</p>\n```\n```css\n/* /style.css */\np{}\n```\n";
        let ops = final_operations(text).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[1],
            StreamOperation::update(p("/style.css"), FileType::Css, "p{}")
        );
    }

    #[test]
    fn test_pure_explanation_has_no_operations() {
        let ops = final_operations("Flexbox aligns items along one axis.").unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_trailing_commas_are_tolerated() {
        let text = "```json\n{\"files\": [{\"action\": \"delete\", \"path\": \"/a.txt\",},],}\n```";
        let ops = final_operations(text).unwrap();
        assert_eq!(ops, vec![StreamOperation::Delete { path: p("/a.txt") }]);
    }

    #[test]
    fn test_bare_array_payload() {
        let text = "```json\n[{\"action\": \"create\", \"path\": \"img\", \"type\": \"folder\"}]\n```";
        let ops = final_operations(text).unwrap();
        assert_eq!(ops, vec![StreamOperation::Folder { path: p("/img") }]);
    }

    #[test]
    fn test_malformed_patch_keeps_raw_text() {
        let body = "{\"files\": [{\"action\": \"update\", \"path\": \"/a\", \"content\": \"oops}]}";
        let text = format!("Explanation.\n```json\n{}\n```", body);
        match final_operations(&text) {
            Err(Error::MalformedPatch { raw, .. }) => assert_eq!(raw.trim(), body),
            other => panic!("expected malformed patch, got {:?}", other),
        }
        assert_eq!(scan(&text).narrative, "Explanation.");
    }

    #[test]
    fn test_last_json_block_wins() {
        let text = "```json\n{\"example\": true}\n```\nNow the real one:\n```json\n{\"files\": []}\n```";
        assert!(final_operations(text).unwrap().is_empty());
        assert_eq!(
            scan(text).narrative,
            "```json\n{\"example\": true}\n```\nNow the real one:"
        );
    }

    #[test]
    fn test_parser_buffer_limit() {
        let mut parser = StreamingPatchParser::new(10);
        assert!(parser.push("hello"));
        assert!(!parser.push("world and more"));
        assert!(parser.is_truncated());
        assert_eq!(parser.full_text(), "hello");
        assert_eq!(parser.view().narrative, "hello");
        assert!(!parser.push("!"));
        assert_eq!(parser.full_text(), "hello");
    }

    #[test]
    fn test_truncated_buffer_has_no_operations() {
        let cut = SCENARIO.find("```json").unwrap();
        let mut parser = StreamingPatchParser::new(cut);
        parser.push(&SCENARIO[..cut]);
        assert!(!parser.is_truncated());
        assert!(!parser.push(&SCENARIO[cut..]));
        // The kept prefix alone would fall back to implicit updates.
        assert_eq!(final_operations(parser.full_text()).unwrap().len(), 1);
        assert!(matches!(
            parser.final_operations(),
            Err(Error::StreamTruncated { limit }) if limit == cut
        ));
        assert_eq!(parser.view().completed_blocks.len(), 1);
    }

    #[test]
    fn test_markdown_file_keeps_nested_examples() {
        let readme = "# Tool\nRun it:\n```bash\nmake run\n```\nDone.";
        let text = format!("Wrote a readme.\n```md\n<!-- /README.md -->\n{}\n```\nThat is all.", readme);
        let view = scan(&text);
        assert_eq!(view.completed_blocks.len(), 1);
        assert_eq!(view.completed_blocks[0].content, readme);
        assert_eq!(view.narrative, "Wrote a readme.\nThat is all.");
        assert!(view.live_block.is_none());
    }

    #[test]
    fn test_markdown_live_block_spans_nested_example() {
        let text = "```markdown\n<!-- /docs/a.md -->\nIntro\n```sh\nls\n```\nStill going";
        let live = scan(text).live_block.unwrap();
        assert_eq!(live.current_file, p("/docs/a.md"));
        assert_eq!(live.current_code, "Intro\n```sh\nls\n```\nStill going");
    }

    #[test]
    fn test_nested_fences_only_in_markdown() {
        let text = "```js\n// /a.js\nlet s = 1;\n```\nAfter.";
        let view = scan(text);
        assert_eq!(view.completed_blocks[0].content, "let s = 1;");
        assert_eq!(view.narrative, "After.");
    }

    #[test]
    fn test_patterns_compile() {
        assert!(PATH_COMMENT.is_match("<!-- /index.html -->"));
        assert!(ROOTED_PATH.is_match(" /a.css"));
    }
}
