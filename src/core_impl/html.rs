use super::*;

/// Parses markup into a standalone document. Fragments (markup without an
/// `<html>` wrapper) land directly under the document root.
pub(crate) fn parse_html(html: &str) -> Result<Dom> {
    let mut cursor = Cursor::new(html);
    let mut tree = TreeBuilder::new();

    while !cursor.is_done() {
        if cursor.at(b"<!--") {
            let end = cursor
                .find_from(cursor.pos + 4, b"-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
            cursor.pos = end + 3;
        } else if cursor.at(b"</") {
            let tag = cursor.end_tag()?;
            tree.close(&tag);
        } else if cursor.at(b"<!") {
            cursor.declaration()?;
        } else if cursor.at(b"<")
            && cursor
                .byte_at(cursor.pos + 1)
                .is_some_and(|b| b.is_ascii_alphabetic())
        {
            let StartTag {
                tag,
                attrs,
                self_closing,
            } = cursor.start_tag()?;
            let node = tree.open(&tag, attrs, self_closing);
            if is_raw_text_tag(&tag) && !self_closing {
                let body = cursor.raw_text(&tag)?;
                if !body.is_empty() {
                    let text = match tag.as_str() {
                        "title" | "textarea" => decode_html_character_references(body),
                        _ => body.to_string(),
                    };
                    tree.dom.create_text(node, text);
                }
                tree.close(&tag);
            }
        } else {
            let text = cursor.text();
            tree.text(decode_html_character_references(text));
        }
    }

    let mut dom = tree.dom;
    dom.rebuild_id_index();
    Ok(dom)
}

struct StartTag {
    tag: String,
    attrs: HashMap<String, String>,
    self_closing: bool,
}

/// The document under construction and its stack of open elements.
struct TreeBuilder {
    dom: Dom,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        let dom = Dom::new();
        let open = vec![dom.root];
        Self { dom, open }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.dom.root)
    }

    fn is_open(&self, index: usize, names: &[&str]) -> bool {
        self.dom
            .tag_name(self.open[index])
            .is_some_and(|open| names.iter().any(|name| open.eq_ignore_ascii_case(name)))
    }

    fn open(&mut self, tag: &str, attrs: HashMap<String, String>, self_closing: bool) -> NodeId {
        self.close_implied(tag);
        let parent = self.current();
        let node = self.dom.create_element(parent, tag.to_string(), attrs);
        if !self_closing && !is_void_tag(tag) {
            self.open.push(node);
        }
        node
    }

    /// Pops up to and including the innermost open `tag`. A stray end tag
    /// changes nothing.
    fn close(&mut self, tag: &str) {
        if let Some(index) = (1..self.open.len()).rev().find(|index| self.is_open(*index, &[tag])) {
            self.open.truncate(index);
        }
    }

    /// Closes elements whose end tag may be omitted before `tag`, without
    /// crossing their scope boundary.
    fn close_implied(&mut self, tag: &str) {
        let (closes, boundaries): (&[&str], &[&str]) = match tag {
            "li" => (&["li"], &["ol", "ul", "menu"]),
            "dt" | "dd" => (&["dt", "dd"], &["dl"]),
            "option" => (&["option"], &["select", "datalist", "optgroup"]),
            "optgroup" => (&["option", "optgroup"], &["select"]),
            "tr" => (&["tr", "td", "th"], &["table", "thead", "tbody", "tfoot"]),
            "td" | "th" => (&["td", "th"], &["tr", "table"]),
            _ if closes_paragraph(tag) => (&["p"], &[]),
            _ => return,
        };
        for index in (1..self.open.len()).rev() {
            if self.is_open(index, closes) {
                self.open.truncate(index);
                return;
            }
            if self.is_open(index, boundaries) {
                return;
            }
        }
    }

    fn text(&mut self, text: String) {
        if !text.is_empty() {
            let parent = self.current();
            self.dom.create_text(parent, text);
        }
    }
}

fn closes_paragraph(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "details"
            | "div"
            | "dl"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hgroup"
            | "hr"
            | "main"
            | "menu"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

/// Byte cursor over the markup.
struct Cursor<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte_at(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    fn peek(&self) -> Option<u8> {
        self.byte_at(self.pos)
    }

    fn at(&self, needle: &[u8]) -> bool {
        self.bytes
            .get(self.pos..self.pos + needle.len())
            .is_some_and(|window| window == needle)
    }

    fn find_from(&self, from: usize, needle: &[u8]) -> Option<usize> {
        self.bytes
            .get(from..)?
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|offset| from + offset)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a str {
        let (src, start) = (self.src, self.pos);
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }

    /// Text up to the next `<`. Always consumes at least one byte, so a
    /// stray `<` becomes text.
    fn text(&mut self) -> &'a str {
        let (src, start) = (self.src, self.pos);
        self.pos = self
            .find_from(start + 1, b"<")
            .unwrap_or(self.bytes.len());
        &src[start..self.pos]
    }

    fn start_tag(&mut self) -> Result<StartTag> {
        self.pos += 1;
        let tag = self.take_while(is_tag_char).to_ascii_lowercase();
        if tag.is_empty() {
            return Err(Error::HtmlParse("empty tag name".into()));
        }

        let mut attrs = HashMap::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(Error::HtmlParse(format!("unclosed start tag <{tag}>"))),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(StartTag {
                        tag,
                        attrs,
                        self_closing: false,
                    });
                }
                Some(b'/') if self.at(b"/>") => {
                    self.pos += 2;
                    return Ok(StartTag {
                        tag,
                        attrs,
                        self_closing: true,
                    });
                }
                Some(b) if !is_attr_name_char(b) => {
                    // Junk such as a stray quote or slash inside the tag.
                    self.pos += 1;
                }
                Some(_) => {
                    let name = self.take_while(is_attr_name_char).to_ascii_lowercase();
                    self.skip_ws();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.attr_value()?
                    } else {
                        String::new()
                    };
                    // First occurrence wins, as in browsers.
                    attrs.entry(name).or_insert(value);
                }
            }
        }
    }

    fn attr_value(&mut self) -> Result<String> {
        let src = self.src;
        let raw = match self.peek() {
            None => return Err(Error::HtmlParse("missing attribute value".into())),
            Some(quote @ (b'"' | b'\'')) => {
                let end = self
                    .find_from(self.pos + 1, &[quote])
                    .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))?;
                let raw = &src[self.pos + 1..end];
                self.pos = end + 1;
                raw
            }
            Some(_) => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                    && !self.at(b"/>")
                {
                    self.pos += 1;
                }
                &src[start..self.pos]
            }
        };
        Ok(decode_html_character_references(raw))
    }

    fn end_tag(&mut self) -> Result<String> {
        self.pos += 2;
        self.skip_ws();
        let tag = self.take_while(is_tag_char).to_ascii_lowercase();
        let close = self
            .find_from(self.pos, b">")
            .ok_or_else(|| Error::HtmlParse("unclosed end tag".into()))?;
        self.pos = close + 1;
        Ok(tag)
    }

    /// Skips `<!doctype ...>` and similar, honoring quotes and brackets.
    fn declaration(&mut self) -> Result<()> {
        let mut quote: Option<u8> = None;
        let mut depth = 0usize;
        self.pos += 2;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'\'' | b'"') => quote = Some(b),
                (None, b'[') => depth += 1,
                (None, b']') => depth = depth.saturating_sub(1),
                (None, b'>') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(Error::HtmlParse("unclosed declaration tag".into()))
    }

    /// Body of a raw-text element. Leaves the cursor after its end tag.
    fn raw_text(&mut self, tag: &str) -> Result<&'a str> {
        let close = self
            .find_raw_end_tag(tag.as_bytes())
            .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
        let src = self.src;
        let body = &src[self.pos..close];
        self.pos = close;
        self.end_tag()?;
        Ok(body)
    }

    fn find_raw_end_tag(&self, tag: &[u8]) -> Option<usize> {
        let mut from = self.pos;
        while let Some(open) = self.find_from(from, b"</") {
            let mut name = open + 2;
            while self.byte_at(name).is_some_and(|b| b.is_ascii_whitespace()) {
                name += 1;
            }
            let name_end = name + tag.len();
            let same_name = self
                .bytes
                .get(name..name_end)
                .is_some_and(|found| found.eq_ignore_ascii_case(tag));
            if same_name && self.byte_at(name_end).is_none_or(|b| !b.is_ascii_alphanumeric()) {
                return Some(open);
            }
            from = open + 1;
        }
        None
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'@' | b'.')
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "title" | "textarea" | "noscript")
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn decode_html_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let name_len = tail
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '#'))
            .unwrap_or(tail.len());
        let name = &tail[..name_len];
        let decoded = match name.strip_prefix('#') {
            Some(number) => decode_numeric_reference(number),
            None => decode_named_reference(name),
        };
        match decoded {
            Some(ch) if name_len > 0 => {
                out.push(ch);
                let after = &tail[name_len..];
                rest = after.strip_prefix(';').unwrap_or(after);
            }
            _ => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric_reference(value: &str) -> Option<char> {
    let codepoint = match value.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => value.parse::<u32>().ok()?,
    };
    char::from_u32(codepoint)
}

fn decode_named_reference(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        "yen" => '¥',
        "laquo" => '«',
        "raquo" => '»',
        "ldquo" => '“',
        "rdquo" => '”',
        "lsquo" => '‘',
        "rsquo" => '’',
        "hellip" => '…',
        "middot" => '·',
        "mdash" => '—',
        "ndash" => '–',
        "times" => '×',
        "deg" => '°',
        "larr" => '←',
        "rarr" => '→',
        _ => return None,
    })
}
