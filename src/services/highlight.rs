//! `syntax.highlight`

use serde::Deserialize;
use std::sync::OnceLock;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use thiserror::Error;

use crate::context::Context;
use crate::http::escape_html;

const PLAIN_TEXT: &str = "txt";
const LINE_SEPARATOR: &str = "<br/>";

static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();

fn syntaxes() -> &'static SyntaxSet {
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HighlightArgs {
    pub text: String,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error(transparent)]
    Syntect(#[from] syntect::Error),
}

/// Syntax and the class name it is reported under
fn lookup<'a>(set: &'a SyntaxSet, lang: Option<&str>) -> (&'a SyntaxReference, String) {
    lang.map(str::trim)
        .filter(|lang| !lang.is_empty())
        .and_then(|lang| {
            set.find_syntax_by_token(lang)
                .map(|syntax| (syntax, lang.to_ascii_lowercase()))
        })
        .unwrap_or_else(|| (set.find_syntax_plain_text(), PLAIN_TEXT.to_string()))
}

/// Highlight `text` as HTML spans with CSS classes
pub fn highlight(_ctx: &mut Context, args: HighlightArgs) -> Result<String, HighlightError> {
    let set = syntaxes();
    let (syntax, lang) = lookup(set, args.lang.as_deref());

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, set, ClassStyle::Spaced);
    for line in LinesWithEndings::from(&args.text) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    let html = generator.finalize().replace('\n', LINE_SEPARATOR);

    Ok(format!(
        "<div class=\"syntax {}\"><pre>{html}</pre></div>",
        escape_html(&lang)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::AppSettings;
    use crate::http::Environ;
    use hyper::Method;

    fn context() -> Context {
        let app = App::builder(AppSettings {
            secure_cookie_key: "highlight-test-key".to_string(),
            ..AppSettings::default()
        })
        .build()
        .unwrap();
        Context::new(app.runtime(), &Environ::new(Method::POST, "/service"))
    }

    fn run(text: &str, lang: Option<&str>) -> String {
        highlight(
            &mut context(),
            HighlightArgs {
                text: text.to_string(),
                lang: lang.map(ToString::to_string),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_known_language() {
        let html = run("fn main() {}\nlet x = 1;\n", Some("rs"));
        assert!(html.starts_with("<div class=\"syntax rs\"><pre>"));
        assert!(html.ends_with("</pre></div>"));
        assert!(html.contains("<span class=\""));
        assert!(html.contains(LINE_SEPARATOR));
        assert!(!html.contains('\n'));
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let html = run("a < b", Some("no-such-language"));
        assert!(html.starts_with("<div class=\"syntax txt\">"));
        assert!(html.contains("a &lt; b"));
    }

    #[test]
    fn test_missing_language() {
        let html = run("plain", None);
        assert!(html.starts_with("<div class=\"syntax txt\">"));
        assert!(html.contains("plain"));
    }
}
