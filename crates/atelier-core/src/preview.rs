//! Preview document builder.
//!
//! Turns an HTML entry file into one self-contained document by inlining the
//! project files it references: stylesheets become `<style>`, external
//! scripts become inline `<script>`, and `<img src>` takes the image file's
//! content (already a data URI). A reference that does not resolve to a
//! project file is left exactly as written.

use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::vfs::{FileRecord, FileType, VfsPath, VirtualFileStore, resolve_relative};

static LINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("link pattern is valid"));

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b(?P<attrs>[^>]*)>\s*</script\s*>").expect("script pattern is valid")
});

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("img pattern is valid"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b(?P<name>[a-z][a-z0-9-]*)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"'>]+))"#)
        .expect("attribute pattern is valid")
});

/// Build the preview document for `entry`.
pub fn render(store: &VirtualFileStore, entry: &VfsPath) -> Result<String> {
    let record = store
        .get(entry)
        .filter(|r| !r.is_sentinel())
        .ok_or_else(|| Error::not_found(entry.as_str()))?;
    let resolver = Resolver { store, entry };

    let html = LINK_TAG.replace_all(&record.content, |caps: &Captures| {
        let tag = &caps[0];
        let is_stylesheet = attribute(tag, "rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")));
        match attribute(tag, "href").filter(|_| is_stylesheet) {
            Some(href) => match resolver.lookup(&href) {
                Some(css) => format!("<style data-source=\"{}\">\n{}\n</style>", css.path, css.content),
                None => tag.to_string(),
            },
            None => tag.to_string(),
        }
    });

    let html = SCRIPT_TAG.replace_all(&html, |caps: &Captures| {
        let attrs = &caps["attrs"];
        let Some(src) = attribute(attrs, "src") else {
            return caps[0].to_string();
        };
        match resolver.lookup(&src) {
            Some(js) => {
                let kept = strip_attribute(attrs, "src");
                format!(
                    "<script{} data-source=\"{}\">\n{}\n</script>",
                    kept,
                    js.path,
                    js.content.replace("</script", "<\\/script")
                )
            }
            None => caps[0].to_string(),
        }
    });

    let html = IMG_TAG.replace_all(&html, |caps: &Captures| {
        let tag = &caps[0];
        match attribute(tag, "src").and_then(|src| resolver.lookup(&src)) {
            Some(image) if image.file_type == FileType::Image => {
                replace_attribute(tag, "src", &image.content)
            }
            _ => tag.to_string(),
        }
    });

    Ok(html.into_owned())
}

struct Resolver<'a> {
    store: &'a VirtualFileStore,
    entry: &'a VfsPath,
}

impl<'a> Resolver<'a> {
    fn lookup(&self, reference: &str) -> Option<&'a FileRecord> {
        let resolved = resolve_relative(self.entry.as_str(), reference)?;
        let path = VfsPath::new(&resolved).ok()?;
        let found = self.store.get(&path).filter(|r| !r.is_sentinel());
        if found.is_none() {
            debug!("preview: '{}' does not resolve to a project file", reference);
        }
        found
    }
}

/// Value of attribute `name` inside a tag's source text.
fn attribute(tag: &str, name: &str) -> Option<String> {
    ATTRIBUTE
        .captures_iter(tag)
        .find(|caps| caps["name"].eq_ignore_ascii_case(name))
        .and_then(|caps| {
            caps.name("dq")
                .or_else(|| caps.name("sq"))
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str().to_string())
        })
}

fn strip_attribute(attrs: &str, name: &str) -> String {
    ATTRIBUTE
        .replace_all(attrs, |caps: &Captures| {
            if caps["name"].eq_ignore_ascii_case(name) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .split_whitespace()
        .fold(String::new(), |mut out, part| {
            out.push(' ');
            out.push_str(part);
            out
        })
}

fn replace_attribute(tag: &str, name: &str, value: &str) -> String {
    let escaped = value.replace('"', "&quot;");
    ATTRIBUTE
        .replace_all(tag, |caps: &Captures| {
            if caps["name"].eq_ignore_ascii_case(name) {
                format!("{}=\"{}\"", &caps["name"], escaped)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
