use crate::position::{Position, Range};
use crate::token::{
    is_raw_text_element, is_structured_html_tag, is_void_element, looks_like_server_tag_name,
    Token, TokenKind, TokenString,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Where an attribute is being read; directives end at `%>` rather than `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeContext {
    Tag,
    Directive,
}

/// Text accumulated since the last non-text token.
struct PendingText {
    value: String,
    start: Position,
    end: Position,
}

/// An element whose closing tag is still expected.
///
/// Passthrough entries track literal tags that share a name with an open
/// structural element, so their closing tags stay literal too. `server`
/// marks tags with `runat` or a capitalized name.
struct OpenTag {
    name: String,
    structural: bool,
    server: bool,
}

/// What a lookahead over a start tag found.
struct TagShape {
    runat: bool,
    self_closing: bool,
}

/// Pull-based lexer for server-side markup.
///
/// Tokens are produced lazily into a queue: `peek(n)` scans as far ahead as
/// needed, `next_token()` pops from the front. Characters are never
/// re-scanned, so positions are computed exactly once.
///
/// Malformed markup never fails: unmatched or unrecognized tags and
/// unterminated comments or code blocks degrade to `Text`.
pub struct Lexer {
    file: Arc<str>,
    chars: Vec<char>,
    pos: usize,
    position: Position,
    buffer: VecDeque<Token>,
    text: Option<PendingText>,
    open_tags: Vec<OpenTag>,
    raw_text: Option<String>,
    finished: bool,
    /// Per terminator, the offset from which it no longer occurs.
    missing: RefCell<HashMap<&'static str, usize>>,
}

impl Lexer {
    /// Create a lexer over `source`; `file` names it in token ranges.
    pub fn new(file: impl Into<Arc<str>>, source: &str) -> Self {
        Self {
            file: file.into(),
            chars: source.chars().collect(),
            pos: 0,
            position: Position::start(),
            buffer: VecDeque::new(),
            text: None,
            open_tags: Vec::new(),
            raw_text: None,
            finished: false,
            missing: RefCell::new(HashMap::new()),
        }
    }

    /// Tokenize the entire source.
    pub fn tokenize(file: impl Into<Arc<str>>, source: &str) -> Vec<Token> {
        Lexer::new(file, source).collect()
    }

    pub fn file(&self) -> &Arc<str> {
        &self.file
    }

    /// Look `offset` tokens ahead of the next one without consuming anything.
    pub fn peek(&mut self, offset: usize) -> Option<&Token> {
        self.fill(offset + 1);
        self.buffer.get(offset)
    }

    pub fn peek_kind(&mut self, offset: usize) -> Option<TokenKind> {
        self.peek(offset).map(|t| t.kind)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.fill(1);
        self.buffer.pop_front()
    }

    fn fill(&mut self, count: usize) {
        while self.buffer.len() < count && !self.finished {
            self.consume();
        }
    }

    /// Scan one construct, or a run of text up to the next `<`.
    fn consume(&mut self) {
        if let Some(tag) = self.raw_text.take() {
            self.consume_raw_text(&tag);
            return;
        }

        if self.is_at_end() {
            self.flush_text();
            self.finished = true;
            return;
        }

        if self.peek_char() == '<' {
            let matched = if self.starts_with("<!--") {
                self.consume_comment()
            } else if self.starts_with("<%") {
                self.consume_server_construct()
            } else if self.starts_with_ignore_case("<!doctype") {
                self.consume_doctype()
            } else {
                self.consume_element()
            };
            if matched {
                return;
            }
            self.push_text_char();
        }

        while !self.is_at_end() && self.peek_char() != '<' {
            self.push_text_char();
        }
    }

    // --- Comments and declarations ---

    /// `<!-- ... -->`, kept verbatim.
    fn consume_comment(&mut self) -> bool {
        let Some(end) = self.find_from(self.pos + 4, "-->") else {
            return false;
        };
        self.flush_text();
        let text = self.capture(end + 3);
        self.emit_text(TokenKind::Comment, text);
        true
    }

    /// `<!DOCTYPE ...>`, kept verbatim.
    fn consume_doctype(&mut self) -> bool {
        let Some(end) = self.find_from(self.pos, ">") else {
            return false;
        };
        self.flush_text();
        let text = self.capture(end + 1);
        self.emit_text(TokenKind::DocType, text);
        true
    }

    /// `<%-- ... --%>`
    fn consume_server_comment(&mut self) -> bool {
        let Some(end) = self.find_from(self.pos + 4, "--%>") else {
            return false;
        };
        self.flush_text();
        let start = self.position;
        self.skip(4);
        let content = self.capture(end);
        self.skip(4);
        self.emit(TokenKind::ServerComment, start, content);
        true
    }

    // --- Code blocks and directives ---

    fn can_consume_server_construct(&self) -> bool {
        if self.starts_with("<%--") {
            self.find_from(self.pos + 4, "--%>").is_some()
        } else {
            self.find_from(self.pos + 2, "%>").is_some()
        }
    }

    /// Any `<% ... %>` form: server comment, directive, statement or expression.
    fn consume_server_construct(&mut self) -> bool {
        if self.starts_with("<%--") {
            return self.consume_server_comment();
        }
        let Some(end) = self.find_from(self.pos + 2, "%>") else {
            return false;
        };

        let (kind, open_len) = match self.char_at(self.pos + 2) {
            '@' => {
                self.consume_directive();
                return true;
            }
            '=' => (TokenKind::Expression, 3),
            ':' => (TokenKind::EncodeExpression, 3),
            '#' => (TokenKind::EvalExpression, 3),
            _ => (TokenKind::Statement, 2),
        };

        self.flush_text();
        let start = self.position;
        self.skip(open_len);
        let code = self.capture(end).trim();
        self.skip(2); // %>
        self.emit(kind, start, code);
        true
    }

    /// `<%@ Kind name="value" ... %>`
    fn consume_directive(&mut self) {
        self.flush_text();
        let start = self.position;
        self.skip(3);
        self.emit_span(TokenKind::StartDirective, start);

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return;
            }
            if self.starts_with("%>") {
                let start = self.position;
                self.skip(2);
                self.emit_span(TokenKind::EndDirective, start);
                return;
            }
            if !self.read_attribute(AttributeContext::Directive) {
                self.advance(); // stray character
            }
        }
    }

    // --- Elements ---

    fn consume_element(&mut self) -> bool {
        if self.char_at(self.pos + 1) == '/' {
            return self.consume_closing_tag();
        }

        let name_start = self.pos + 1;
        if !self.char_at(name_start).is_alphabetic() {
            return false;
        }
        let name_end = self.tag_name_end(name_start);
        let name: String = self.chars[name_start..name_end].iter().collect();
        let shape = self.inspect_tag(name_end);
        let void = !name.contains(':') && is_void_element(&name);

        let server = shape.runat || looks_like_server_tag_name(&name);
        let structural = server || is_structured_html_tag(&name);
        if !structural {
            if !shape.self_closing && !void && self.has_open_structural(&name) {
                self.open_tags.push(OpenTag {
                    name,
                    structural: false,
                    server: false,
                });
            }
            self.push_text_until(name_end);
            return true;
        }

        self.flush_text();
        let start = self.position;
        self.skip(1);
        self.emit_span(TokenKind::TagOpen, start);
        self.emit_tag_name(name_end);

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return true;
            }
            if self.peek_char() == '>' {
                let start = self.position;
                self.skip(1);
                self.emit_span(TokenKind::TagClose, start);
                if !void {
                    if is_raw_text_element(&name) {
                        self.raw_text = Some(name.clone());
                    }
                    self.open_tags.push(OpenTag {
                        name,
                        structural: true,
                        server,
                    });
                }
                return true;
            }
            if self.starts_with("/>") {
                let start = self.position;
                self.skip(2);
                self.emit_span(TokenKind::TagSlashClose, start);
                return true;
            }
            if self.starts_with("<%") && self.can_consume_server_construct() {
                self.consume_server_construct();
                continue;
            }
            if !self.read_attribute(AttributeContext::Tag) {
                self.advance(); // stray character
            }
        }
    }

    /// `</name>`. Structural when it closes the innermost open tag, or when
    /// it could only be meant for a server element; in the latter case the
    /// innermost structural element is the one closed. Other mismatched
    /// closing tags, such as `</html>` after an unclosed `<head>`, are text.
    fn consume_closing_tag(&mut self) -> bool {
        let name_start = self.pos + 2;
        if !self.char_at(name_start).is_alphabetic() {
            return false;
        }
        let name_end = self.tag_name_end(name_start);
        let name: String = self.chars[name_start..name_end].iter().collect();

        let top_matches = self
            .open_tags
            .last()
            .is_some_and(|t| t.name.eq_ignore_ascii_case(&name));
        if top_matches {
            let structural = self.open_tags.pop().is_some_and(|t| t.structural);
            if !structural {
                self.push_text_until(name_end);
                return true;
            }
        } else {
            let server_open = self
                .open_tags
                .iter()
                .any(|t| t.server && t.name.eq_ignore_ascii_case(&name));
            if !looks_like_server_tag_name(&name) && !server_open {
                return false;
            }
            let Some(index) = self.open_tags.iter().rposition(|t| t.structural) else {
                return false;
            };
            self.open_tags.truncate(index);
        }

        self.flush_text();
        let start = self.position;
        self.skip(2);
        self.emit_span(TokenKind::TagOpenSlash, start);
        self.emit_tag_name(name_end);
        self.skip_whitespace();
        if self.peek_char() == '>' {
            let start = self.position;
            self.skip(1);
            self.emit_span(TokenKind::TagClose, start);
        }
        true
    }

    /// Emit `ElementName`, preceded by `ElementNamespace` for `prefix:name`.
    fn emit_tag_name(&mut self, name_end: usize) {
        let name = self.capture(name_end);
        match name.value.chars().position(|c| c == ':') {
            Some(colon) => {
                let (prefix, rest) = name.split_at(colon);
                let local = rest.slice(1, rest.value.chars().count());
                self.emit_text(TokenKind::ElementNamespace, prefix);
                self.emit_text(TokenKind::ElementName, local);
            }
            None => self.emit_text(TokenKind::ElementName, name),
        }
    }

    fn has_open_structural(&self, name: &str) -> bool {
        self.open_tags
            .iter()
            .any(|t| t.structural && t.name.eq_ignore_ascii_case(name))
    }

    /// Scan ahead to the end of a start tag without consuming, looking for
    /// a `runat` attribute. Quotes and embedded code blocks are skipped.
    fn inspect_tag(&self, from: usize) -> TagShape {
        let mut shape = TagShape {
            runat: false,
            self_closing: false,
        };
        let mut quote: Option<char> = None;
        let mut i = from;

        while i < self.chars.len() {
            if self.starts_with_at(i, "<%") {
                match self.find_from(i + 2, "%>") {
                    Some(end) => {
                        i = end + 2;
                        continue;
                    }
                    None => break,
                }
            }

            let c = self.chars[i];
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '>' => {
                        shape.self_closing = i > from && self.chars[i - 1] == '/';
                        break;
                    }
                    '<' => break,
                    c if c.is_whitespace() => {
                        if self.is_runat_at(i + 1) {
                            shape.runat = true;
                        }
                    }
                    _ => {}
                },
            }
            i += 1;
        }

        shape
    }

    fn is_runat_at(&self, index: usize) -> bool {
        let matches = "runat"
            .chars()
            .enumerate()
            .all(|(k, c)| self.char_at(index + k).eq_ignore_ascii_case(&c));
        let after = self.char_at(index + 5);
        matches && (after == '=' || after == '>' || after == '/' || after == '\0' || after.is_whitespace())
    }

    // --- Raw text ---

    /// Body of `<script>`/`<style>`: verbatim up to the matching close tag,
    /// except that code blocks are still lexed.
    fn consume_raw_text(&mut self, tag: &str) {
        while !self.is_at_end() {
            if self.peek_char() == '<' {
                if self.is_closing_tag_for(tag) {
                    return;
                }
                if self.starts_with("<%") && self.can_consume_server_construct() {
                    self.consume_server_construct();
                    continue;
                }
            }
            self.push_text_char();
        }
    }

    fn is_closing_tag_for(&self, tag: &str) -> bool {
        if !self.starts_with("</") {
            return false;
        }
        let name_start = self.pos + 2;
        let name_end = self.tag_name_end(name_start);
        let name: String = self.chars[name_start..name_end].iter().collect();
        name_end > name_start && name.eq_ignore_ascii_case(tag)
    }

    // --- Attributes ---

    /// Read `name`, optionally followed by `= value`. Returns false if no
    /// name could be read at the current position.
    fn read_attribute(&mut self, context: AttributeContext) -> bool {
        let mut end = self.pos;
        while end < self.chars.len() && !self.ends_attribute_name(end, context) {
            end += 1;
        }
        if end == self.pos {
            return false;
        }

        let name = self.capture(end);
        self.emit_text(TokenKind::Attribute, name);

        self.skip_whitespace();
        if self.peek_char() != '=' {
            return true;
        }
        self.skip(1);
        self.skip_whitespace();

        match self.peek_char() {
            q @ ('"' | '\'') => self.read_quoted_value(q),
            _ => self.read_unquoted_value(context),
        }
        true
    }

    fn ends_attribute_name(&self, index: usize, context: AttributeContext) -> bool {
        let c = self.chars[index];
        c.is_whitespace()
            || matches!(c, '\0' | '"' | '\'' | '>' | '/' | '=')
            || self.starts_with_at(index, "<%")
            || (context == AttributeContext::Directive && self.starts_with_at(index, "%>"))
    }

    /// A quoted value; embedded code blocks split it into several
    /// `AttributeValue` fragments around the code tokens.
    fn read_quoted_value(&mut self, quote: char) {
        self.skip(1);
        let mut fragment = self.position;
        let mut emitted = false;

        while !self.is_at_end() && self.peek_char() != quote {
            if self.starts_with("<%") && self.can_consume_server_construct() {
                if self.position.offset > fragment.offset {
                    self.emit_value(fragment);
                }
                self.consume_server_construct();
                emitted = true;
                fragment = self.position;
                continue;
            }
            self.advance();
        }

        if self.position.offset > fragment.offset || !emitted {
            self.emit_value(fragment);
        }
        if !self.is_at_end() {
            self.skip(1); // closing quote
        }
    }

    fn read_unquoted_value(&mut self, context: AttributeContext) {
        let start = self.position;
        while !self.is_at_end() {
            let c = self.peek_char();
            if c.is_whitespace()
                || matches!(c, '<' | '>' | '`')
                || (context == AttributeContext::Directive && self.starts_with("%>"))
            {
                break;
            }
            self.advance();
        }
        self.emit_value(start);
    }

    fn emit_value(&mut self, start: Position) {
        let value: String = self.chars[start.offset..self.pos].iter().collect();
        let text = TokenString::new(value, self.range_from(start));
        self.emit_text(TokenKind::AttributeValue, text);
    }

    // --- Text accumulation ---

    fn push_text_char(&mut self) {
        let start = self.position;
        let ch = self.advance();
        let end = self.position;
        match &mut self.text {
            Some(text) => {
                text.value.push(ch);
                text.end = end;
            }
            None => {
                self.text = Some(PendingText {
                    value: ch.to_string(),
                    start,
                    end,
                })
            }
        }
    }

    fn push_text_until(&mut self, end: usize) {
        while self.pos < end && !self.is_at_end() {
            self.push_text_char();
        }
    }

    fn flush_text(&mut self) {
        if let Some(text) = self.text.take() {
            let range = Range::new(self.file.clone(), text.start, text.end);
            self.buffer.push_back(Token::new(
                TokenKind::Text,
                range.clone(),
                TokenString::new(text.value, range),
            ));
        }
    }

    // --- Emitting ---

    /// Emit a token spanning `start..current` with the given text.
    fn emit(&mut self, kind: TokenKind, start: Position, text: TokenString) {
        self.flush_text();
        let range = self.range_from(start);
        self.buffer.push_back(Token::new(kind, range, text));
    }

    /// Emit a token whose range is exactly its text.
    fn emit_text(&mut self, kind: TokenKind, text: TokenString) {
        self.flush_text();
        self.buffer
            .push_back(Token::new(kind, text.range.clone(), text));
    }

    /// Emit a token whose text is the source between `start` and the current position.
    fn emit_span(&mut self, kind: TokenKind, start: Position) {
        let value: String = self.chars[start.offset..self.pos].iter().collect();
        let text = TokenString::new(value, self.range_from(start));
        self.emit_text(kind, text);
    }

    // --- Helpers ---

    fn capture(&mut self, end: usize) -> TokenString {
        let start = self.position;
        let mut value = String::new();
        while self.pos < end && !self.is_at_end() {
            value.push(self.advance());
        }
        TokenString::new(value, self.range_from(start))
    }

    fn range_from(&self, start: Position) -> Range {
        Range::new(self.file.clone(), start, self.position)
    }

    fn tag_name_end(&self, from: usize) -> usize {
        let mut end = from;
        while end < self.chars.len() {
            let c = self.chars[end];
            if !(c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.')) {
                break;
            }
            end += 1;
        }
        end
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek_char().is_whitespace() {
            self.advance();
        }
    }

    fn skip(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn advance(&mut self) -> char {
        let ch = self.peek_char();
        if !self.is_at_end() {
            self.position = self
                .position
                .advance(ch, self.chars.get(self.pos + 1).copied());
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> char {
        self.char_at(self.pos)
    }

    fn char_at(&self, index: usize) -> char {
        self.chars.get(index).copied().unwrap_or('\0')
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        self.starts_with_at(self.pos, pattern)
    }

    fn starts_with_at(&self, index: usize, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(index + i) == Some(&c))
    }

    fn starts_with_ignore_case(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.char_at(self.pos + i).eq_ignore_ascii_case(&c))
    }

    /// First occurrence of `pattern` at or after `from`. A failed search
    /// is remembered, so later searches past that point return at once.
    fn find_from(&self, from: usize, pattern: &'static str) -> Option<usize> {
        if self
            .missing
            .borrow()
            .get(pattern)
            .is_some_and(|&missing_from| from >= missing_from)
        {
            return None;
        }
        let found = (from..self.chars.len()).find(|&i| self.starts_with_at(i, pattern));
        if found.is_none() {
            self.missing
                .borrow_mut()
                .entry(pattern)
                .and_modify(|missing_from| *missing_from = (*missing_from).min(from))
                .or_insert(from);
        }
        found
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}
