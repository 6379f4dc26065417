use super::*;

/// A parsed selector group list (`a > b, .c`). Parsed once, then matched
/// against any number of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList {
    chains: Vec<Vec<Compound>>,
}

impl SelectorList {
    pub(crate) fn parse(selector: &str) -> Result<Self> {
        let chains = split_selector_groups(selector)?
            .iter()
            .map(|group| parse_chain(group))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { chains })
    }

    pub(crate) fn chains(&self) -> &[Vec<Compound>] {
        &self.chains
    }

    /// The id of a plain `#id` selector, which can be served from the id index.
    pub(crate) fn single_id(&self) -> Option<&str> {
        match self.chains.as_slice() {
            [chain] => match chain.as_slice() {
                [only] => only.simple.id_only(),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    NextSibling,
    LaterSibling,
}

/// One compound selector and how it relates to the compound on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Compound {
    pub(crate) simple: SimpleSelectors,
    pub(crate) combinator: Option<Combinator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SimpleSelectors {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<AttrMatch>,
    pub(crate) pseudos: Vec<Pseudo>,
}

impl SimpleSelectors {
    fn id_only(&self) -> Option<&str> {
        let bare = !self.universal
            && self.tag.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudos.is_empty();
        if bare { self.id.as_deref() } else { None }
    }

    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudos.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Substring,
    Word,
    DashPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrMatch {
    pub(crate) name: String,
    pub(crate) op: AttrOp,
    pub(crate) value: String,
}

/// `an+b`. `odd` is `2n+1`, a bare integer `k` is `0n+k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NthFormula {
    pub(crate) a: i64,
    pub(crate) b: i64,
}

impl NthFormula {
    const FIRST: NthFormula = NthFormula { a: 0, b: 1 };

    /// Whether the 1-based `index` is produced by some `n >= 0`.
    pub(crate) fn matches(self, index: usize) -> bool {
        let diff = index as i64 - self.b;
        if self.a == 0 {
            return diff == 0;
        }
        diff % self.a == 0 && diff / self.a >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pseudo {
    Nth {
        formula: NthFormula,
        of_type: bool,
        from_end: bool,
    },
    Only {
        of_type: bool,
    },
    Empty,
    Root,
    /// hover, focus and friends. No static document is ever in these states.
    Interaction,
    Not(SelectorList),
    Is(SelectorList),
    Has(SelectorList),
}

fn keyword_pseudo(name: &str) -> Option<Pseudo> {
    let nth = |of_type, from_end| Pseudo::Nth {
        formula: NthFormula::FIRST,
        of_type,
        from_end,
    };
    Some(match name {
        "first-child" => nth(false, false),
        "last-child" => nth(false, true),
        "first-of-type" => nth(true, false),
        "last-of-type" => nth(true, true),
        "only-child" => Pseudo::Only { of_type: false },
        "only-of-type" => Pseudo::Only { of_type: true },
        "empty" => Pseudo::Empty,
        "root" => Pseudo::Root,
        "hover" | "active" | "focus" | "focus-within" | "focus-visible" | "visited" => {
            Pseudo::Interaction
        }
        _ => return None,
    })
}

/// Tracks bracket, paren and quote nesting while a selector is scanned.
#[derive(Debug, Default)]
struct Nesting {
    brackets: usize,
    parens: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Nesting {
    /// Feeds one char. Returns true when it sits outside every bracket,
    /// paren and string.
    fn feed(&mut self, ch: char, selector: &str) -> Result<bool> {
        if let Some(quote) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == quote {
                self.quote = None;
            }
            return Ok(false);
        }
        let was_top = self.brackets == 0 && self.parens == 0;
        match ch {
            '"' | '\'' => self.quote = Some(ch),
            '[' => self.brackets += 1,
            '(' => self.parens += 1,
            ']' => {
                self.brackets = self.brackets.checked_sub(1).ok_or_else(|| unsupported(selector))?;
            }
            ')' => {
                self.parens = self.parens.checked_sub(1).ok_or_else(|| unsupported(selector))?;
            }
            _ => {}
        }
        Ok(was_top && !matches!(ch, '"' | '\'' | '[' | '('))
    }

    fn finish(&self, selector: &str) -> Result<()> {
        if self.brackets != 0 || self.parens != 0 || self.quote.is_some() {
            return Err(unsupported(selector));
        }
        Ok(())
    }
}

fn unsupported(selector: &str) -> Error {
    Error::UnsupportedSelector(selector.to_string())
}

/// Splits a selector list on its top-level commas. Each group is trimmed;
/// an empty group is an error.
pub(crate) fn split_selector_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();
    let mut push = |current: &mut String| {
        let group = current.trim();
        if group.is_empty() {
            return Err(unsupported(selector));
        }
        groups.push(group.to_string());
        current.clear();
        Ok(())
    };

    for ch in selector.chars() {
        if nesting.feed(ch, selector)? && ch == ',' {
            push(&mut current)?;
        } else {
            current.push(ch);
        }
    }
    nesting.finish(selector)?;
    push(&mut current)?;
    Ok(groups)
}

enum ChainToken {
    Compound(String),
    Combinator(Combinator),
}

fn tokenize_chain(selector: &str) -> Result<Vec<ChainToken>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();
    let flush = |current: &mut String, tokens: &mut Vec<ChainToken>| {
        if !current.is_empty() {
            tokens.push(ChainToken::Compound(std::mem::take(current)));
        }
    };

    for ch in selector.chars() {
        if !nesting.feed(ch, selector)? {
            current.push(ch);
            continue;
        }
        let combinator = match ch {
            '>' => Combinator::Child,
            '+' => Combinator::NextSibling,
            '~' => Combinator::LaterSibling,
            ch if ch.is_ascii_whitespace() => {
                flush(&mut current, &mut tokens);
                continue;
            }
            _ => {
                current.push(ch);
                continue;
            }
        };
        flush(&mut current, &mut tokens);
        tokens.push(ChainToken::Combinator(combinator));
    }
    nesting.finish(selector)?;
    flush(&mut current, &mut tokens);
    Ok(tokens)
}

fn parse_chain(selector: &str) -> Result<Vec<Compound>> {
    let mut chain: Vec<Compound> = Vec::new();
    let mut explicit: Option<Combinator> = None;

    for token in tokenize_chain(selector)? {
        match token {
            ChainToken::Combinator(combinator) => {
                if explicit.is_some() || chain.is_empty() {
                    return Err(unsupported(selector));
                }
                explicit = Some(combinator);
            }
            ChainToken::Compound(text) => {
                let combinator = if chain.is_empty() {
                    None
                } else {
                    Some(explicit.take().unwrap_or(Combinator::Descendant))
                };
                chain.push(Compound {
                    simple: parse_compound(&text)?,
                    combinator,
                });
            }
        }
    }
    if chain.is_empty() || explicit.is_some() {
        return Err(unsupported(selector));
    }
    Ok(chain)
}

fn parse_compound(part: &str) -> Result<SimpleSelectors> {
    let bytes = part.as_bytes();
    let mut simple = SimpleSelectors::default();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'*' if !simple.universal && simple.tag.is_none() => {
                simple.universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                if simple.id.replace(id).is_some() {
                    return Err(unsupported(part));
                }
                i = next;
            }
            b'.' => {
                let (class_name, next) = parse_ident(part, i + 1).ok_or_else(|| unsupported(part))?;
                simple.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (attr, next) = parse_attr_match(part, i)?;
                simple.attrs.push(attr);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_pseudo(part, i + 1).ok_or_else(|| unsupported(part))?;
                simple.pseudos.push(pseudo);
                i = next;
            }
            _ if i == 0 => {
                let (tag, next) = parse_ident(part, i).ok_or_else(|| unsupported(part))?;
                simple.tag = Some(tag);
                i = next;
            }
            _ => return Err(unsupported(part)),
        }
    }

    if simple.is_empty() {
        return Err(unsupported(part));
    }
    Ok(simple)
}

fn parse_pseudo(part: &str, start: usize) -> Option<(Pseudo, usize)> {
    let tail = part.get(start..)?;
    let name_len = tail
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
        .count();
    let name = tail[..name_len].to_ascii_lowercase();
    let after_name = start + name_len;

    if part.as_bytes().get(after_name) != Some(&b'(') {
        let pseudo = keyword_pseudo(&name)?;
        return ends_compound_piece(part, after_name).then_some((pseudo, after_name));
    }

    let body_start = after_name + 1;
    let close = find_matching_paren(part.get(body_start..)?)?;
    let body = part[body_start..body_start + close].trim();
    let next = body_start + close + 1;
    if body.is_empty() || !ends_compound_piece(part, next) {
        return None;
    }

    let nth = |of_type, from_end| {
        parse_nth_formula(body).map(|formula| Pseudo::Nth {
            formula,
            of_type,
            from_end,
        })
    };
    let pseudo = match name.as_str() {
        "not" => Pseudo::Not(SelectorList::parse(body).ok()?),
        "is" | "where" => Pseudo::Is(SelectorList::parse(body).ok()?),
        "has" => Pseudo::Has(SelectorList::parse(body).ok()?),
        "nth-child" => nth(false, false)?,
        "nth-last-child" => nth(false, true)?,
        "nth-of-type" => nth(true, false)?,
        "nth-last-of-type" => nth(true, true)?,
        _ => return None,
    };
    Some((pseudo, next))
}

fn ends_compound_piece(part: &str, at: usize) -> bool {
    part.as_bytes()
        .get(at)
        .is_none_or(|b| matches!(b, b'.' | b'#' | b'[' | b':'))
}

/// Index of the `)` closing a paren opened just before `body`.
fn find_matching_paren(body: &str) -> Option<usize> {
    let mut nesting = Nesting {
        parens: 1,
        ..Nesting::default()
    };
    for (idx, ch) in body.char_indices() {
        nesting.feed(ch, body).ok()?;
        if ch == ')' && nesting.parens == 0 && nesting.quote.is_none() {
            return Some(idx);
        }
    }
    None
}

fn parse_nth_formula(raw: &str) -> Option<NthFormula> {
    let compact = raw
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    match compact.as_str() {
        "odd" => return Some(NthFormula { a: 2, b: 1 }),
        "even" => return Some(NthFormula { a: 2, b: 0 }),
        _ => {}
    }

    let Some((a_part, b_part)) = compact.split_once('n') else {
        // A bare position: positive and unsigned.
        if compact.starts_with(['+', '-']) {
            return None;
        }
        let b = compact.parse::<i64>().ok().filter(|b| *b > 0)?;
        return Some(NthFormula { a: 0, b });
    };

    let a = match a_part {
        "" => 1,
        "-" => -1,
        "+" => return None,
        _ => a_part.parse::<i64>().ok()?,
    };
    let b = match b_part.as_bytes().first() {
        None => 0,
        Some(b'+') => b_part[1..].parse::<i64>().ok()?,
        Some(b'-') => -b_part[1..].parse::<i64>().ok()?,
        Some(_) => return None,
    };
    Some(NthFormula { a, b })
}

fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let len = src
        .as_bytes()
        .get(start..)?
        .iter()
        .take_while(|b| is_selector_ident_char(**b))
        .count();
    if len == 0 {
        return None;
    }
    Some((src.get(start..start + len)?.to_string(), start + len))
}

pub(crate) fn is_selector_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b >= 0x80
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn parse_attr_match(src: &str, open_bracket: usize) -> Result<(AttrMatch, usize)> {
    let bytes = src.as_bytes();
    let name_start = skip_ws(bytes, open_bracket + 1);
    let name_len = bytes[name_start..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':'))
        .count();
    if name_len == 0 {
        return Err(unsupported(src));
    }
    let name = src[name_start..name_start + name_len].to_ascii_lowercase();

    let mut i = skip_ws(bytes, name_start + name_len);
    if bytes.get(i) == Some(&b']') {
        let attr = AttrMatch {
            name,
            op: AttrOp::Exists,
            value: String::new(),
        };
        return Ok((attr, i + 1));
    }

    let (op, width) = match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'='), _) => (AttrOp::Equals, 1),
        (Some(b'^'), Some(b'=')) => (AttrOp::Prefix, 2),
        (Some(b'$'), Some(b'=')) => (AttrOp::Suffix, 2),
        (Some(b'*'), Some(b'=')) => (AttrOp::Substring, 2),
        (Some(b'~'), Some(b'=')) => (AttrOp::Word, 2),
        (Some(b'|'), Some(b'=')) => (AttrOp::DashPrefix, 2),
        _ => return Err(unsupported(src)),
    };
    i = skip_ws(bytes, i + width);
    let (value, after_value) = parse_attr_value(src, i)?;
    i = skip_ws(bytes, after_value);
    if bytes.get(i) != Some(&b']') {
        return Err(unsupported(src));
    }
    Ok((AttrMatch { name, op, value }, i + 1))
}

fn parse_attr_value(src: &str, start: usize) -> Result<(String, usize)> {
    let bytes = src.as_bytes();
    let quote = match bytes.get(start) {
        None => return Err(unsupported(src)),
        Some(q @ (b'"' | b'\'')) => Some(*q),
        Some(_) => None,
    };

    let body_start = start + usize::from(quote.is_some());
    let mut i = body_start;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            i = (i + 2).min(bytes.len());
            continue;
        }
        let at_end = match quote {
            Some(q) => b == q,
            None => b.is_ascii_whitespace() || b == b']',
        };
        if at_end {
            break;
        }
        i += 1;
    }
    if quote.is_some() && i >= bytes.len() {
        return Err(unsupported(src));
    }
    let raw = src.get(body_start..i).ok_or_else(|| unsupported(src))?;
    Ok((css_unescape(raw), i + usize::from(quote.is_some())))
}

fn css_unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            _ => out.push(ch),
        }
    }
    out
}

/// Drops pseudo-class and pseudo-element suffixes so a rule selector like
/// `.btn:hover::after` can be used to find the elements it styles.
pub(crate) fn base_selector(selector: &str) -> String {
    static PSEUDO: std::sync::OnceLock<Option<fancy_regex::Regex>> = std::sync::OnceLock::new();
    let pattern = PSEUDO.get_or_init(|| {
        fancy_regex::Regex::new(
            r"::?(?:hover|active|focus-within|focus-visible|focus|visited|before|after|first-line|first-letter|placeholder|selection)(?![\w-])",
        )
        .ok()
    });
    let stripped = match pattern {
        Some(pattern) => pattern.replace_all(selector, "").into_owned(),
        None => selector.to_string(),
    };
    let trimmed = stripped.trim();
    if trimmed.is_empty() || trimmed.ends_with(['>', '+', '~']) {
        // A bare or dangling pseudo-class step collapses to `*`.
        format!("{trimmed}*")
    } else {
        trimmed.to_string()
    }
}
