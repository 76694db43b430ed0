//! Minimal namespace-tolerant XML scanning for SAML messages.
//!
//! Elements are matched by local name, so `<saml:Issuer>`, `<saml2:Issuer>`
//! and `<Issuer>` are equivalent. Nested elements with the same qualified name
//! are not supported; SAML responses do not use them for the elements read
//! here.

/// One element found in a document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Element<'a> {
    /// Qualified name as written, e.g. `saml:Assertion`
    pub qname: &'a str,
    /// Start tag including the angle brackets
    pub tag: &'a str,
    /// Everything between the start and end tags
    pub inner: &'a str,
    /// Byte offset just past the element
    pub end: usize,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        tag_attribute(self.tag, name)
    }

    pub fn text(&self) -> String {
        unescape(self.inner.trim())
    }
}

/// Byte offset just past a comment, CDATA section, processing instruction or
/// declaration starting at `start`, or `None` for an ordinary tag.
///
/// Unterminated markup runs to the end of the document.
fn skip_markup(xml: &str, start: usize) -> Option<usize> {
    let rest = &xml[start..];
    let terminator = if rest.starts_with("<!--") {
        "-->"
    } else if rest.starts_with("<![CDATA[") {
        "]]>"
    } else if rest.starts_with("<?") {
        "?>"
    } else if rest.starts_with("<!") {
        ">"
    } else {
        return None;
    };
    Some(
        rest[2..]
            .find(terminator)
            .map_or(xml.len(), |i| start + 2 + i + terminator.len()),
    )
}

/// Next element with local name `local` starting at byte `from`.
///
/// Comments and CDATA sections are skipped, so markup inside them is never
/// matched.
pub(crate) fn next_element<'a>(xml: &'a str, local: &str, from: usize) -> Option<Element<'a>> {
    let mut pos = from;
    while pos < xml.len() {
        let start = pos + xml[pos..].find('<')?;
        if let Some(next) = skip_markup(xml, start) {
            pos = next;
            continue;
        }
        let rest = &xml[start + 1..];
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let qname = &rest[..name_len];

        if !qname.is_empty() && local_name(qname) == local {
            let tag_end = start + xml[start..].find('>')? + 1;
            let tag = &xml[start..tag_end];
            if tag.ends_with("/>") {
                return Some(Element {
                    qname,
                    tag,
                    inner: "",
                    end: tag_end,
                });
            }
            let close = format!("</{}>", qname);
            let close_start = tag_end + xml[tag_end..].find(&close)?;
            return Some(Element {
                qname,
                tag,
                inner: &xml[tag_end..close_start],
                end: close_start + close.len(),
            });
        }
        pos = start + 1;
    }
    None
}

/// First element with local name `local`.
pub(crate) fn element<'a>(xml: &'a str, local: &str) -> Option<Element<'a>> {
    next_element(xml, local, 0)
}

/// All sibling-or-later elements with local name `local`.
pub(crate) fn elements<'a>(xml: &'a str, local: &str) -> Vec<Element<'a>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(el) = next_element(xml, local, pos) {
        pos = el.end;
        found.push(el);
    }
    found
}

/// Every start tag in document order, comments and CDATA excluded.
fn start_tags(xml: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut pos = 0;
    while let Some(rel) = xml[pos..].find('<') {
        let start = pos + rel;
        if let Some(next) = skip_markup(xml, start) {
            pos = next;
            continue;
        }
        let Some(end_rel) = xml[start..].find('>') else {
            break;
        };
        let end = start + end_rel + 1;
        if !xml[start + 1..].starts_with('/') {
            tags.push(&xml[start..end]);
        }
        pos = end;
    }
    tags
}

/// First `ID` attribute value carried by more than one element.
pub(crate) fn duplicate_id(xml: &str) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    start_tags(xml)
        .into_iter()
        .filter_map(|tag| tag_attribute(tag, "ID"))
        .find(|id| !seen.insert(id.clone()))
}

/// Whether the document carries a document type declaration.
pub(crate) fn has_doctype(xml: &str) -> bool {
    let mut pos = 0;
    while let Some(rel) = xml[pos..].find("<!") {
        let start = pos + rel;
        if xml[start..].starts_with("<!DOCTYPE") {
            return true;
        }
        pos = skip_markup(xml, start).unwrap_or(start + 2);
    }
    false
}

/// Name of the document element, skipping the prolog and comments.
pub(crate) fn root_name(xml: &str) -> Option<&str> {
    let mut pos = 0;
    loop {
        let start = pos + xml[pos..].find('<')?;
        if let Some(next) = skip_markup(xml, start) {
            pos = next;
            continue;
        }
        let rest = &xml[start + 1..];
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        return Some(local_name(&rest[..name_len]));
    }
}

/// Rough well-formedness check: every opened element is closed in order.
pub(crate) fn is_well_formed(xml: &str) -> bool {
    let mut stack: Vec<&str> = Vec::new();
    let mut pos = 0;
    let mut saw_element = false;

    while let Some(rel) = xml[pos..].find('<') {
        let start = pos + rel;
        if let Some(next) = skip_markup(xml, start) {
            pos = next;
            continue;
        }
        let Some(end_rel) = xml[start..].find('>') else {
            return false;
        };
        let end = start + end_rel;
        let body = &xml[start + 1..end];
        pos = end + 1;

        if let Some(name) = body.strip_prefix('/') {
            match stack.pop() {
                Some(open) if open == name.trim() => {}
                _ => return false,
            }
            continue;
        }
        let name = body
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        if name.is_empty() {
            return false;
        }
        saw_element = true;
        if !body.ends_with('/') {
            stack.push(name);
        }
    }
    saw_element && stack.is_empty()
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn tag_attribute(tag: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = tag[search..].find(name) {
        let at = search + rel;
        search = at + name.len();

        let preceded_by_space = tag[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let rest = &tag[search..];
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }
        let rest = &rest[1..];
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value_end = rest[1..].find(quote)?;
        return Some(unescape(&rest[1..1 + value_end]));
    }
    None
}

pub(crate) fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
