//! Markup for styled report text blocks.
//!
//! Text blocks in a report are written in a small XML-like markup and parsed into lines of
//! [`Span`]s before being handed to [`genpdf`][genpdf]. The markup supports:
//!
//! - `<b>...</b>` and `<i>...</i>` for bold and italic text
//! - `<font color="#RRGGBB">...</font>` for colored text
//! - `<br/>` for an explicit line break
//! - the entities `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;` and numeric `&#NN;` / `&#xHH;`
//!
//! Anything that comes from outside the report template must go through [`escape`] first so
//! that `<`, `&` and quotes are printed rather than interpreted.
//!
//! [genpdf]: https://docs.rs/genpdf/

use std::fmt;

use genpdf::style::{Color, Style, StyledString};

/// A slice of text together with inline style attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
    color: Option<Color>,
}

impl Span {
    /// Returns the raw text contained in this span.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether the span should be rendered in bold.
    pub fn is_bold(&self) -> bool {
        self.bold
    }

    /// Returns whether the span should be rendered in italic.
    pub fn is_italic(&self) -> bool {
        self.italic
    }

    /// Returns the configured color for the span, if any.
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    fn to_style(&self) -> Style {
        let mut style = Style::new();
        if let Some(color) = self.color {
            style.set_color(color);
        }
        if self.bold {
            style.set_bold();
        }
        if self.italic {
            style.set_italic();
        }
        style
    }

    /// Converts the span to a [`StyledString`].
    pub fn to_styled_string(&self) -> StyledString {
        StyledString::new(self.text.clone(), self.to_style())
    }
}

/// One visual line of a text block, as delimited by `<br/>`.
pub type Line = Vec<Span>;

/// Escapes `text` so that it is printed verbatim inside a text block.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Replaces literal newlines (`\n` or `\r\n`) with `<br/>` so paragraph structure survives.
pub fn newlines_to_breaks(markup: &str) -> String {
    markup.replace("\r\n", "\n").replace('\n', "<br/>")
}

/// Flattens parsed lines back into plain text, joining lines with `\n`.
pub fn plain_text(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| line.iter().map(Span::text).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse errors produced by [`parse_markup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    index: usize,
    message: String,
}

impl ParseError {
    fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }

    /// Byte index in the original input string where the error was detected.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Human-readable description of the parsing error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.index)
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Copy, Debug, Default)]
struct StyleState {
    bold: bool,
    italic: bool,
    color: Option<Color>,
}

impl StyleState {
    fn to_span(self, text: impl Into<String>) -> Span {
        Span {
            text: text.into(),
            bold: self.bold,
            italic: self.italic,
            color: self.color,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Bold,
    Italic,
    Font,
}

impl Marker {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "b" => Some(Self::Bold),
            "i" => Some(Self::Italic),
            "font" => Some(Self::Font),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Marker::Bold => "b",
            Marker::Italic => "i",
            Marker::Font => "font",
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    index: usize,
    lines: Vec<Line>,
    current: Line,
    buffer: String,
    stack: Vec<(Marker, StyleState)>,
    state: StyleState,
}

/// Parses markup into lines of [`Span`]s.
///
/// Every `<br/>` starts a new line, so the result always holds at least one (possibly empty)
/// line. Unknown tags, mismatched closing tags and malformed entities are reported with their
/// byte position.
pub fn parse_markup(input: &str) -> Result<Vec<Line>, ParseError> {
    let mut parser = Parser {
        input,
        index: 0,
        lines: Vec::new(),
        current: Vec::new(),
        buffer: String::new(),
        stack: Vec::new(),
        state: StyleState::default(),
    };
    parser.run()?;
    Ok(parser.lines)
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.index..]
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(ch) = self.rest().chars().next() {
            match ch {
                '<' => self.parse_tag()?,
                '&' => {
                    let decoded = self.parse_entity()?;
                    self.buffer.push(decoded);
                }
                other => {
                    self.buffer.push(other);
                    self.index += other.len_utf8();
                }
            }
        }

        if let Some((marker, _)) = self.stack.last() {
            return Err(ParseError::new(
                self.index,
                format!("unterminated <{}> tag", marker.name()),
            ));
        }

        self.flush();
        self.lines.push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        self.current.push(self.state.to_span(text));
    }

    fn parse_tag(&mut self) -> Result<(), ParseError> {
        let start = self.index;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| ParseError::new(start, "unterminated tag; use `&lt;` for a literal `<`"))?;
        let input = self.input;
        let raw = &input[start + 1..start + end];
        self.index = start + end + 1;

        let body = raw.trim();
        if let Some(name) = body.strip_prefix('/') {
            return self.close(start, name.trim());
        }

        let self_closing = body.ends_with('/');
        let body = body.trim_end_matches('/').trim_end();
        let (name, attributes) = match body.find(char::is_whitespace) {
            Some(split) => (&body[..split], body[split..].trim()),
            None => (body, ""),
        };

        if name == "br" {
            self.flush();
            self.lines.push(std::mem::take(&mut self.current));
            return Ok(());
        }

        let marker = Marker::from_name(name)
            .ok_or_else(|| ParseError::new(start, format!("unsupported tag <{}>", name)))?;
        if self_closing {
            return Err(ParseError::new(
                start,
                format!("<{}/> cannot be self-closing", name),
            ));
        }

        self.flush();
        self.stack.push((marker, self.state));
        match marker {
            Marker::Bold => self.state.bold = true,
            Marker::Italic => self.state.italic = true,
            Marker::Font => self.state.color = Some(parse_color_attribute(start, attributes)?),
        }
        Ok(())
    }

    fn close(&mut self, start: usize, name: &str) -> Result<(), ParseError> {
        match self.stack.last() {
            Some((marker, _)) if marker.name() == name => {
                self.flush();
                if let Some((_, previous)) = self.stack.pop() {
                    self.state = previous;
                }
                Ok(())
            }
            Some((marker, _)) => Err(ParseError::new(
                start,
                format!("expected </{}> but found </{}>", marker.name(), name),
            )),
            None => Err(ParseError::new(
                start,
                format!("unexpected closing tag </{}>", name),
            )),
        }
    }

    fn parse_entity(&mut self) -> Result<char, ParseError> {
        let start = self.index;
        let end = self
            .rest()
            .find(';')
            .filter(|end| *end <= 10)
            .ok_or_else(|| ParseError::new(start, "bare `&`; use `&amp;` for a literal ampersand"))?;
        let input = self.input;
        let name = &input[start + 1..start + end];
        self.index = start + end + 1;

        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            numeric => numeric.strip_prefix('#').and_then(|code| {
                let value = match code.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => code.parse::<u32>().ok(),
                };
                value.and_then(char::from_u32)
            }),
        };

        decoded.ok_or_else(|| ParseError::new(start, format!("unknown entity `&{};`", name)))
    }
}

fn parse_color_attribute(index: usize, attributes: &str) -> Result<Color, ParseError> {
    let value = attributes
        .strip_prefix("color")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('='))
        .map(str::trim_start)
        .and_then(|rest| {
            rest.strip_prefix('"')
                .and_then(|quoted| quoted.strip_suffix('"'))
        })
        .ok_or_else(|| ParseError::new(index, "expected `<font color=\"#RRGGBB\">`"))?;

    let hex = value
        .strip_prefix('#')
        .filter(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| {
            ParseError::new(index, "invalid RGB specification; expected `#RRGGBB`")
        })?;

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| ParseError::new(index, "invalid RGB specification"))
    };
    Ok(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
