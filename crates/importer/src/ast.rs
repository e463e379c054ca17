//! Recorded-script recognizer
//!
//! The external recorder emits a Python replay script. This module lifts
//! it into a stream of [`RawAction`]s: one record per recognized driver
//! call, with the locator chain preserved verbatim. It is a statement-
//! wise recognizer over a small vocabulary, not a Python interpreter:
//! each logical line is tokenized and parsed into a call chain, then
//! matched against the known `page.…` / `expect(…)` shapes. Unknown
//! shapes become warnings plus passthrough comments; recorder
//! boilerplate is skipped silently.

use std::collections::BTreeMap;

/// One link of a locator chain: method name plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorCall {
    pub method: String,
    pub args: Vec<String>,
    pub kwargs: Vec<(String, String)>,
}

/// One recognized driver call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAction {
    /// Action kind: goto, click, fill, press, expect_visible, …
    pub kind: String,
    pub locator_chain: Vec<LocatorCall>,
    pub args: BTreeMap<String, String>,
    /// 1-based source line of the statement
    pub line: usize,
    /// iframe selector when the call went through `content_frame`
    pub frame: Option<String>,
}

/// A non-fatal finding during parsing.
#[derive(Debug, Clone)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub message: String,
    /// The source text, preserved as a passthrough comment
    pub source: String,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub actions: Vec<RawAction>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

const LOCATOR_METHODS: &[&str] = &[
    "get_by_role",
    "get_by_test_id",
    "get_by_label",
    "get_by_placeholder",
    "get_by_text",
    "locator",
    "filter",
    "nth",
    "first",
    "last",
];

const ACTION_METHODS: &[&str] = &[
    "click",
    "dblclick",
    "fill",
    "press",
    "check",
    "uncheck",
    "select_option",
    "scroll_into_view_if_needed",
];

const EXPECT_METHODS: &[&str] = &[
    "to_be_visible",
    "to_be_hidden",
    "to_have_text",
    "to_contain_text",
    "to_have_url",
];

/// Recorder boilerplate that needs no conversion and no warning.
const IGNORABLE_CALLS: &[&str] = &[
    "close",
    "launch",
    "new_context",
    "new_page",
    "stop",
    "run",
    "sync_playwright",
    "set_default_timeout",
];

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    LParen,
    RParen,
    Comma,
    Eq,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err("unterminated string literal".to_string());
                    }
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        let next = chars[i + 1];
                        value.push(match next {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        i += 1;
                        break;
                    }
                    value.push(ch);
                    i += 1;
                }
                tokens.push(Token::Str(value));
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                // fractional wheel deltas are truncated
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number: {}", text))?;
                tokens.push(Token::Int(value as i64));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Expression shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum PyExpr {
    /// `base.seg(args).seg…` — base is the leading identifier
    Chain { base: String, segs: Vec<Segment> },
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    name: String,
    /// None for attribute access, Some for a call
    call: Option<Vec<PyArg>>,
}

#[derive(Debug, Clone, PartialEq)]
enum PyArg {
    Pos(PyExpr),
    Kw(String, PyExpr),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.bump() {
            Some(t) if t == token => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", token, other)),
        }
    }

    fn parse_expr(&mut self) -> Result<PyExpr, String> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(PyExpr::Str(s)),
            Some(Token::Int(n)) => Ok(PyExpr::Int(n)),
            Some(Token::Ident(ident)) => {
                if ident == "True" {
                    return Ok(PyExpr::Bool(true));
                }
                if ident == "False" {
                    return Ok(PyExpr::Bool(false));
                }
                let mut segs = Vec::new();
                // a call directly on the base identifier: run(...), expect(...)
                if self.peek() == Some(&Token::LParen) {
                    let args = self.parse_args()?;
                    segs.push(Segment {
                        name: ident.clone(),
                        call: Some(args),
                    });
                    let mut chain = PyExpr::Chain {
                        base: ident,
                        segs,
                    };
                    self.parse_postfix(&mut chain)?;
                    return Ok(chain);
                }
                let mut chain = PyExpr::Chain { base: ident, segs };
                self.parse_postfix(&mut chain)?;
                Ok(chain)
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_postfix(&mut self, expr: &mut PyExpr) -> Result<(), String> {
        let segs = match expr {
            PyExpr::Chain { segs, .. } => segs,
            _ => return Ok(()),
        };
        while self.peek() == Some(&Token::Dot) {
            self.bump();
            let name = match self.bump() {
                Some(Token::Ident(name)) => name,
                other => return Err(format!("expected attribute name, found {:?}", other)),
            };
            let call = if self.peek() == Some(&Token::LParen) {
                Some(self.parse_args()?)
            } else {
                None
            };
            segs.push(Segment { name, call });
        }
        Ok(())
    }

    fn parse_args(&mut self) -> Result<Vec<PyArg>, String> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.bump();
                    break;
                }
                None => return Err("unterminated argument list".to_string()),
                _ => {}
            }
            // keyword argument: ident '=' expr
            let checkpoint = self.pos;
            if let Some(Token::Ident(name)) = self.peek().cloned() {
                self.bump();
                if self.peek() == Some(&Token::Eq) {
                    self.bump();
                    let value = self.parse_expr()?;
                    args.push(PyArg::Kw(name, value));
                    self.eat_comma();
                    continue;
                }
                self.pos = checkpoint;
            }
            let value = self.parse_expr()?;
            args.push(PyArg::Pos(value));
            self.eat_comma();
        }
        Ok(args)
    }

    fn eat_comma(&mut self) {
        if self.peek() == Some(&Token::Comma) {
            self.bump();
        }
    }
}

// ---------------------------------------------------------------------------
// Statement recognition
// ---------------------------------------------------------------------------

pub struct ScriptParser;

impl ScriptParser {
    /// Parse a recorded script into raw actions plus diagnostics.
    pub fn parse(source: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        for (line_no, statement) in logical_statements(source) {
            if statement.is_empty() || !is_candidate_statement(&statement) {
                continue;
            }
            match Self::recognize(&statement, line_no) {
                Recognized::Action(action) => outcome.actions.push(action),
                Recognized::Skip => {}
                Recognized::Unknown(message) => {
                    tracing::warn!("line {}: {}", line_no, message);
                    outcome.diagnostics.push(ParseDiagnostic {
                        line: line_no,
                        message,
                        source: statement,
                    });
                }
            }
        }
        outcome
    }

    fn recognize(statement: &str, line: usize) -> Recognized {
        let tokens = match tokenize(statement) {
            Ok(tokens) => tokens,
            Err(e) => return Recognized::Unknown(format!("unparseable statement: {}", e)),
        };
        let mut parser = Parser::new(tokens);
        let expr = match parser.parse_expr() {
            Ok(expr) => expr,
            Err(e) => return Recognized::Unknown(format!("unparseable statement: {}", e)),
        };
        let (base, segs) = match expr {
            PyExpr::Chain { base, segs } => (base, segs),
            _ => return Recognized::Skip,
        };

        match base.as_str() {
            "page" => Self::recognize_page(&segs, line),
            "expect" => Self::recognize_expect(&segs, line),
            _ => {
                if segs
                    .first()
                    .map(|s| IGNORABLE_CALLS.contains(&s.name.as_str()))
                    .unwrap_or(false)
                {
                    Recognized::Skip
                }
                // bare identifiers and assignments hold no action
                else if segs.is_empty() {
                    Recognized::Skip
                } else {
                    Recognized::Unknown(format!("unsupported call on '{}'", base))
                }
            }
        }
    }

    fn recognize_page(segs: &[Segment], line: usize) -> Recognized {
        if segs.is_empty() {
            return Recognized::Skip;
        }

        // page.goto("url")
        if segs.len() == 1 && segs[0].name == "goto" {
            let url = segs[0]
                .call
                .as_ref()
                .and_then(|args| first_string(args));
            let mut action_args = BTreeMap::new();
            if let Some(url) = url {
                action_args.insert("url".to_string(), url);
            }
            return Recognized::Action(RawAction {
                kind: "goto".to_string(),
                locator_chain: Vec::new(),
                args: action_args,
                line,
                frame: None,
            });
        }

        // page.mouse.wheel(dx, dy)
        if segs.len() == 2 && segs[0].name == "mouse" && segs[1].name == "wheel" {
            let mut args = BTreeMap::new();
            if let Some(call) = &segs[1].call {
                let numbers: Vec<i64> = call
                    .iter()
                    .filter_map(|a| match a {
                        PyArg::Pos(PyExpr::Int(n)) => Some(*n),
                        _ => None,
                    })
                    .collect();
                args.insert(
                    "deltaX".to_string(),
                    numbers.first().copied().unwrap_or(0).to_string(),
                );
                args.insert(
                    "deltaY".to_string(),
                    numbers.get(1).copied().unwrap_or(0).to_string(),
                );
            }
            return Recognized::Action(RawAction {
                kind: "scroll".to_string(),
                locator_chain: Vec::new(),
                args,
                line,
                frame: None,
            });
        }

        let last = segs.last().expect("segs non-empty");
        if last.call.is_none() {
            return Recognized::Skip;
        }
        if IGNORABLE_CALLS.contains(&last.name.as_str()) {
            return Recognized::Skip;
        }
        if !ACTION_METHODS.contains(&last.name.as_str()) {
            return Recognized::Unknown(format!("unsupported page method '.{}()'", last.name));
        }

        let (locator_chain, frame) = match extract_locator_chain(&segs[..segs.len() - 1]) {
            Ok(pair) => pair,
            Err(message) => return Recognized::Unknown(message),
        };
        if locator_chain.is_empty() {
            return Recognized::Unknown(format!(
                "action '.{}()' without a recognizable locator",
                last.name
            ));
        }

        let kind = match last.name.as_str() {
            "select_option" => "select_option".to_string(),
            "scroll_into_view_if_needed" => "scroll_into_view".to_string(),
            other => other.to_string(),
        };
        let mut args = BTreeMap::new();
        if let Some(call) = &last.call {
            match last.name.as_str() {
                "fill" | "select_option" => {
                    if let Some(value) = first_string(call) {
                        args.insert("value".to_string(), value);
                    }
                }
                "press" => {
                    if let Some(key) = first_string(call) {
                        args.insert("key".to_string(), key);
                    }
                }
                _ => {}
            }
        }

        Recognized::Action(RawAction {
            kind,
            locator_chain,
            args,
            line,
            frame,
        })
    }

    fn recognize_expect(segs: &[Segment], line: usize) -> Recognized {
        // expect(<target>).to_xxx(args)
        let expect_call = match segs.first().and_then(|s| s.call.as_ref()) {
            Some(call) => call,
            None => return Recognized::Unknown("expect without a call".to_string()),
        };
        let assertion = match segs.get(1) {
            Some(seg) if EXPECT_METHODS.contains(&seg.name.as_str()) => seg,
            Some(seg) => {
                return Recognized::Unknown(format!("unsupported assertion '.{}()'", seg.name))
            }
            None => return Recognized::Unknown("expect without an assertion".to_string()),
        };

        let target = match expect_call.first() {
            Some(PyArg::Pos(expr)) => expr,
            _ => return Recognized::Unknown("expect without a target".to_string()),
        };

        // expect(page).to_have_url("...")
        if let PyExpr::Chain { base, segs } = target {
            if base == "page" && segs.is_empty() {
                if assertion.name != "to_have_url" {
                    return Recognized::Unknown(format!(
                        "unsupported page assertion '.{}()'",
                        assertion.name
                    ));
                }
                let mut args = BTreeMap::new();
                if let Some(call) = &assertion.call {
                    if let Some(url) = first_string(call) {
                        args.insert("url".to_string(), url);
                    }
                }
                return Recognized::Action(RawAction {
                    kind: "expect_url".to_string(),
                    locator_chain: Vec::new(),
                    args,
                    line,
                    frame: None,
                });
            }

            if base == "page" {
                let (locator_chain, frame) = match extract_locator_chain(segs) {
                    Ok(pair) => pair,
                    Err(message) => return Recognized::Unknown(message),
                };
                let kind = match assertion.name.as_str() {
                    "to_be_visible" => "expect_visible",
                    "to_be_hidden" => "expect_hidden",
                    "to_have_text" | "to_contain_text" => "expect_text",
                    other => return Recognized::Unknown(format!("unsupported assertion '{}'", other)),
                };
                let mut args = BTreeMap::new();
                if kind == "expect_text" {
                    if let Some(call) = &assertion.call {
                        if let Some(text) = first_string(call) {
                            args.insert("text".to_string(), text);
                        }
                    }
                }
                return Recognized::Action(RawAction {
                    kind: kind.to_string(),
                    locator_chain,
                    args,
                    line,
                    frame,
                });
            }
        }

        Recognized::Unknown("unsupported expect target".to_string())
    }
}

enum Recognized {
    Action(RawAction),
    Skip,
    Unknown(String),
}

/// Split the locator prefix of a page call into its chain, handling the
/// `page.locator("iframe").content_frame.…` scoping form.
fn extract_locator_chain(segs: &[Segment]) -> Result<(Vec<LocatorCall>, Option<String>), String> {
    let mut chain = Vec::new();
    let mut frame = None;
    let mut i = 0;
    while i < segs.len() {
        let seg = &segs[i];
        match &seg.call {
            None => {
                // attribute access: only content_frame after locator(...)
                if seg.name == "content_frame" {
                    if chain.len() == 1 {
                        let head: &LocatorCall = &chain[0];
                        if head.method == "locator" {
                            frame = head.args.first().cloned();
                            chain.clear();
                            i += 1;
                            continue;
                        }
                    }
                    return Err("content_frame in an unsupported position".to_string());
                }
                if seg.name == "first" || seg.name == "last" {
                    chain.push(LocatorCall {
                        method: seg.name.clone(),
                        args: Vec::new(),
                        kwargs: Vec::new(),
                    });
                    i += 1;
                    continue;
                }
                return Err(format!("unsupported attribute '.{}'", seg.name));
            }
            Some(call) => {
                if !LOCATOR_METHODS.contains(&seg.name.as_str()) {
                    return Err(format!("unsupported locator method '.{}()'", seg.name));
                }
                let mut args = Vec::new();
                let mut kwargs = Vec::new();
                for arg in call {
                    match arg {
                        PyArg::Pos(PyExpr::Str(s)) => args.push(s.clone()),
                        PyArg::Pos(PyExpr::Int(n)) => args.push(n.to_string()),
                        PyArg::Kw(name, value) => {
                            let rendered = match value {
                                PyExpr::Str(s) => s.clone(),
                                PyExpr::Int(n) => n.to_string(),
                                PyExpr::Bool(b) => if *b { "True" } else { "False" }.to_string(),
                                PyExpr::Chain { .. } => {
                                    return Err(format!(
                                        "unsupported keyword value for '{}'",
                                        name
                                    ))
                                }
                            };
                            kwargs.push((name.clone(), rendered));
                        }
                        PyArg::Pos(_) => {
                            return Err(format!(
                                "unsupported positional argument in '.{}()'",
                                seg.name
                            ))
                        }
                    }
                }
                chain.push(LocatorCall {
                    method: seg.name.clone(),
                    args,
                    kwargs,
                });
                i += 1;
            }
        }
    }
    Ok((chain, frame))
}

fn first_string(args: &[PyArg]) -> Option<String> {
    args.iter().find_map(|a| match a {
        PyArg::Pos(PyExpr::Str(s)) => Some(s.clone()),
        _ => None,
    })
}

/// Join continuation lines into logical statements, tracking the line
/// number where each statement starts.
fn logical_statements(source: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut buffer = String::new();
    let mut start_line = 0;
    let mut depth: i32 = 0;

    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if depth == 0 {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            start_line = idx + 1;
            buffer.clear();
        }
        buffer.push_str(line);
        depth += line.chars().filter(|c| *c == '(').count() as i32;
        depth -= line.chars().filter(|c| *c == ')').count() as i32;
        if depth <= 0 {
            out.push((start_line, buffer.clone()));
            depth = 0;
        } else {
            buffer.push(' ');
        }
    }
    out
}

/// Statements worth handing to the recognizer. Imports, definitions and
/// assignments carry no replayable action.
fn is_candidate_statement(statement: &str) -> bool {
    let skip_prefixes = [
        "import ", "from ", "def ", "class ", "with ", "if ", "return", "#",
    ];
    if skip_prefixes.iter().any(|p| statement.starts_with(p)) {
        return false;
    }
    // simple assignments (context = browser.new_context()) are recorder
    // plumbing; comparison operators never occur in generated scripts
    if statement.contains(" = ") {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_goto() {
        let outcome = ScriptParser::parse(r#"page.goto("https://example.com/login")"#);
        assert_eq!(outcome.actions.len(), 1);
        let action = &outcome.actions[0];
        assert_eq!(action.kind, "goto");
        assert_eq!(action.args["url"], "https://example.com/login");
        assert_eq!(action.line, 1);
    }

    #[test]
    fn recognizes_role_click_with_kwargs() {
        let outcome =
            ScriptParser::parse(r#"page.get_by_role("button", name="Sign in").click()"#);
        let action = &outcome.actions[0];
        assert_eq!(action.kind, "click");
        assert_eq!(action.locator_chain.len(), 1);
        let call = &action.locator_chain[0];
        assert_eq!(call.method, "get_by_role");
        assert_eq!(call.args, vec!["button"]);
        assert_eq!(call.kwargs, vec![("name".to_string(), "Sign in".to_string())]);
    }

    #[test]
    fn recognizes_fill_with_value() {
        let outcome = ScriptParser::parse(r##"page.locator("#email").fill("u@e.com")"##);
        let action = &outcome.actions[0];
        assert_eq!(action.kind, "fill");
        assert_eq!(action.args["value"], "u@e.com");
        assert_eq!(action.locator_chain[0].method, "locator");
        assert_eq!(action.locator_chain[0].args, vec!["#email"]);
    }

    #[test]
    fn recognizes_expect_visible_and_expect_url() {
        let source = r#"
expect(page.get_by_test_id("banner")).to_be_visible()
expect(page).to_have_url("https://example.com/done")
"#;
        let outcome = ScriptParser::parse(source);
        assert_eq!(outcome.actions.len(), 2);
        assert_eq!(outcome.actions[0].kind, "expect_visible");
        assert_eq!(outcome.actions[0].locator_chain[0].method, "get_by_test_id");
        assert_eq!(outcome.actions[1].kind, "expect_url");
        assert_eq!(outcome.actions[1].args["url"], "https://example.com/done");
    }

    #[test]
    fn content_frame_scopes_into_an_iframe() {
        let outcome = ScriptParser::parse(
            r#"page.locator("iframe#editor").content_frame.get_by_label("Body").fill("hello")"#,
        );
        let action = &outcome.actions[0];
        assert_eq!(action.frame.as_deref(), Some("iframe#editor"));
        assert_eq!(action.locator_chain[0].method, "get_by_label");
    }

    #[test]
    fn mouse_wheel_becomes_scroll() {
        let outcome = ScriptParser::parse("page.mouse.wheel(0, 600)");
        let action = &outcome.actions[0];
        assert_eq!(action.kind, "scroll");
        assert_eq!(action.args["deltaY"], "600");
    }

    #[test]
    fn boilerplate_is_skipped_without_warnings() {
        let source = r#"
import re
from playwright.sync_api import Playwright, sync_playwright, expect

def run(playwright: Playwright) -> None:
    browser = playwright.chromium.launch(headless=False)
    context = browser.new_context()
    page = context.new_page()
    page.goto("https://example.com/")
    page.close()
    context.close()
    browser.close()

with sync_playwright() as playwright:
    run(playwright)
"#;
        let outcome = ScriptParser::parse(source);
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].kind, "goto");
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    }

    #[test]
    fn unknown_shapes_warn_and_keep_the_source() {
        let outcome = ScriptParser::parse(r#"page.get_by_role("button").hover()"#);
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("hover"));
        assert!(outcome.diagnostics[0].source.contains("hover"));
    }

    #[test]
    fn multiline_calls_are_joined() {
        let source = "page.get_by_role(\n    \"button\", name=\"Sign in\"\n).click()";
        let outcome = ScriptParser::parse(source);
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].kind, "click");
        assert_eq!(outcome.actions[0].line, 1);
    }
}
