//! Default HTML error pages
//!
//! Every page shares one wrapper that links the site stylesheet when the
//! asset manifest provides one.

const ERROR_401: &str = r#"
  <div class="site-error">
    <h1>Not Authorized</h1>
    Your session may have expired or you may not have access.
    <ul>
      <li><a href="/">Return home</a></li>
      <li><a href="/login">Login</a></li>
    </ul>
  </div>
"#;

const ERROR_403: &str = r#"
  <div class="site-error">
    <h1>Forbidden</h1>
    <ul>
      <li><a href="/">Return home</a></li>
      <li><a href="/login">Login</a></li>
    </ul>
  </div>
"#;

const ERROR_404: &str = r#"
  <div class="site-error">
    <h1>The item you requested was not found</h1>
    You may have clicked a dead link or mistyped the address. Some web addresses
    are case sensitive.
    <ul>
      <li><a href="/">Return home</a></li>
    </ul>
  </div>
"#;

const ERROR_503: &str = r#"
  <div class="site-error">
    <h1>Service Unavailable</h1>
    The service is temporarily down for maintenance. Please try again later.
    <ul>
      <li><a href="/">Return home</a></li>
    </ul>
  </div>
"#;

#[derive(Debug, Clone)]
pub struct ErrorPages {
    head: String,
}

impl ErrorPages {
    /// Pages linking `stylesheet` (if any) from their head
    pub fn new(stylesheet: Option<&str>) -> Self {
        let mut head = String::from("<!DOCTYPE html>\n<meta charset=utf-8>\n<title>Error!</title>\n");
        if let Some(href) = stylesheet {
            head.push_str(&format!("<link rel=stylesheet href=\"{}\">\n", escape_html(href)));
        }
        head.push_str("<body>\n");
        Self { head }
    }

    fn wrap(&self, content: &str) -> String {
        format!("{}{content}", self.head)
    }

    pub fn unauthorized(&self) -> String {
        self.wrap(ERROR_401)
    }

    pub fn forbidden(&self) -> String {
        self.wrap(ERROR_403)
    }

    pub fn not_found(&self) -> String {
        self.wrap(ERROR_404)
    }

    pub fn unavailable(&self) -> String {
        self.wrap(ERROR_503)
    }

    /// 500 page; `traceback` is already-escaped HTML
    pub fn server_error(&self, traceback: Option<&str>) -> String {
        let detail = traceback
            .map(|tb| format!("    <div class=\"traceback\">{tb}</div>\n"))
            .unwrap_or_default();
        self.wrap(&format!(
            r#"
  <div class="site-error">
    <h1>Sorry, something went wrong!</h1>
    There was an application error. This has been logged and will be resolved as
    soon as possible.
    <ul>
      <li><a href="/">Return home</a></li>
    </ul>
{detail}  </div>
"#
        ))
    }
}

impl Default for ErrorPages {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_stylesheet_link() {
        let pages = ErrorPages::new(Some("/static/site.1a2b.css"));
        let page = pages.not_found();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"<link rel=stylesheet href="/static/site.1a2b.css">"#));
        assert!(page.contains("was not found"));
        assert!(!ErrorPages::default().not_found().contains("<link"));
    }

    #[test]
    fn test_server_error_traceback() {
        let pages = ErrorPages::default();
        assert!(!pages.server_error(None).contains("traceback"));
        let page = pages.server_error(Some("Boom: &lt;bad&gt;"));
        assert!(page.contains(r#"<div class="traceback">Boom: &lt;bad&gt;</div>"#));
    }
}
