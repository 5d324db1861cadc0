//! Translation of simple XPath location paths into CSS selectors.
//!
//! The static renderer has no XPath engine, so the common shapes used for
//! content selection are rewritten to an equivalent CSS selector:
//!
//! | XPath                         | CSS                    |
//! |-------------------------------|------------------------|
//! | `//*[@id="content"]`          | `*[id="content"]`      |
//! | `/html/body/main`             | `html:root > body > main` |
//! | `//div[@class]//p[2]`         | `div[class] p:nth-of-type(2)` |
//! | `//a[contains(@href, "docs")]`| `a[href*="docs"]`      |
//! | `//div[1][@role="main"]`      | `div:nth-of-type(1)[role="main"]` |
//!
//! A position must come before any attribute test in its step:
//! `//div[@role="main"][1]` picks the first of the matching divs, which CSS
//! can't express. Anything else (axes, functions other than `contains`,
//! unions) is rejected.

use kbcrawl_core::error::CrawlError;

pub fn xpath_to_css(xpath: &str) -> Result<String, CrawlError> {
    Parser::new(xpath).parse()
}

fn unsupported(xpath: &str, reason: &str) -> CrawlError {
    CrawlError::RendererError(format!("unsupported XPath '{xpath}': {reason}"))
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.trim().chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<String, CrawlError> {
        let mut css = String::new();
        let mut first = true;

        while self.pos < self.chars.len() {
            if !self.eat('/') {
                return Err(self.error("expected '/'"));
            }
            let descendant = self.eat('/');

            if first {
                let step = self.step()?;
                css.push_str(&step);
                if !descendant {
                    css.push_str(":root");
                }
                first = false;
            } else {
                css.push_str(if descendant { " " } else { " > " });
                css.push_str(&self.step()?);
            }
        }

        if first {
            return Err(self.error("empty path"));
        }
        Ok(css)
    }

    fn step(&mut self) -> Result<String, CrawlError> {
        let wildcard = self.eat('*');
        let mut css = if wildcard {
            "*".to_string()
        } else {
            let name = self.name();
            if name.is_empty() {
                return Err(self.error("expected element name or '*'"));
            }
            if self.peek() == Some(':') || self.peek() == Some('(') {
                return Err(self.error("axes and node tests are not supported"));
            }
            name
        };

        let mut filtered = false;
        while self.eat('[') {
            self.skip_ws();
            // `div[@a][1]` counts among the matching divs only, which CSS
            // can't express. `div[1][@a]` is `div:nth-of-type(1)[a]`.
            let positional = self.peek().is_some_and(|c| c.is_ascii_digit());
            if positional && filtered {
                return Err(self.error("a position after an attribute test has no CSS equivalent"));
            }
            filtered |= !positional;
            let predicate = self.predicate(wildcard)?;
            self.skip_ws();
            if !self.eat(']') {
                return Err(self.error("expected ']'"));
            }
            css.push_str(&predicate);
        }
        Ok(css)
    }

    fn predicate(&mut self, wildcard: bool) -> Result<String, CrawlError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                let position: usize = digits.parse().map_err(|_| self.error("bad position"))?;
                if position == 0 {
                    return Err(self.error("positions start at 1"));
                }
                let pseudo = if wildcard { "nth-child" } else { "nth-of-type" };
                Ok(format!(":{pseudo}({position})"))
            }
            Some('@') => {
                self.pos += 1;
                let attr = self.name();
                if attr.is_empty() {
                    return Err(self.error("expected attribute name"));
                }
                self.skip_ws();
                if self.eat('=') {
                    self.skip_ws();
                    let value = self.literal()?;
                    Ok(format!("[{attr}=\"{}\"]", escape(&value)))
                } else {
                    Ok(format!("[{attr}]"))
                }
            }
            _ => {
                let function = self.name();
                if function != "contains" || !self.eat('(') {
                    return Err(self.error("only positions, attribute tests and contains() are supported"));
                }
                self.skip_ws();
                if !self.eat('@') {
                    return Err(self.error("contains() must test an attribute"));
                }
                let attr = self.name();
                self.skip_ws();
                if !self.eat(',') {
                    return Err(self.error("expected ',' in contains()"));
                }
                self.skip_ws();
                let value = self.literal()?;
                self.skip_ws();
                if !self.eat(')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(format!("[{attr}*=\"{}\"]", escape(&value)))
            }
        }
    }

    fn literal(&mut self) -> Result<String, CrawlError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.pos += 1;
        let value = self.take_while(|c| c != quote);
        if !self.eat(quote) {
            return Err(self.error("unterminated string"));
        }
        Ok(value)
    }

    fn name(&mut self) -> String {
        self.take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &str) -> CrawlError {
        unsupported(self.source, &format!("{reason} at offset {}", self.pos))
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_common_shapes() {
        let cases = [
            ("//*[@id=\"content\"]", "*[id=\"content\"]"),
            ("//*[@id='content']", "*[id=\"content\"]"),
            ("/html/body/main", "html:root > body > main"),
            ("//div[@class]//p[2]", "div[class] p:nth-of-type(2)"),
            ("//ul/*[3]", "ul > *:nth-child(3)"),
            ("//a[contains(@href, \"docs\")]", "a[href*=\"docs\"]"),
            ("//div[1][@role=\"main\"]", "div:nth-of-type(1)[role=\"main\"]"),
            ("//article", "article"),
        ];
        for (xpath, css) in cases {
            assert_eq!(xpath_to_css(xpath).unwrap(), css, "{xpath}");
        }
    }

    #[test]
    fn translated_selectors_parse_as_css() {
        for xpath in ["//*[@data-x=\"a b\"]", "/html/body/div[2]", "//a[contains(@href,'x')]"] {
            let css = xpath_to_css(xpath).unwrap();
            assert!(scraper::Selector::parse(&css).is_ok(), "{xpath} -> {css}");
        }
    }

    #[test]
    fn rejects_unsupported_expressions() {
        for xpath in [
            "//div/text()",
            "//child::div",
            "//div[last()]",
            "//div | //p",
            "//div[0]",
            "//div[@role=\"main\"][1]",
            "//*[contains(@class, \"x\")][2]",
            "//div[@id=\"open",
            "/",
            "",
        ] {
            assert!(
                matches!(xpath_to_css(xpath), Err(CrawlError::RendererError(_))),
                "{xpath} should be rejected"
            );
        }
    }
}
