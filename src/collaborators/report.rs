//! Standalone HTML rendering of a synthesis analysis.

use chrono::Utc;

use super::ReportRenderer;

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReportRenderer;

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, query: &str, analysis: &str) -> String {
        let title = escape_html(query);
        let heading = formula_to_html(query);
        let generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let mut body = String::new();
        for block in analysis.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
            let lines: Vec<String> = block.lines().map(escape_html).collect();
            body.push_str("    <p>");
            body.push_str(&lines.join("<br>\n"));
            body.push_str("</p>\n");
        }

        format!(
            "<!DOCTYPE html>
<html lang=\"en\">
<head>
  <meta charset=\"utf-8\">
  <title>Synthesis report: {title}</title>
  <style>
    body {{ font-family: sans-serif; max-width: 52rem; margin: 2rem auto; line-height: 1.5; }}
    footer {{ color: #666; font-size: 0.85rem; margin-top: 2rem; }}
  </style>
</head>
<body>
  <h1>{heading}</h1>
  <section>
{body}  </section>
  <footer>Generated {generated}</footer>
</body>
</html>
"
        )
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `Fe2O3` -> `Fe<sub>2</sub>O<sub>3</sub>`, escaping everything else.
pub fn formula_to_html(formula: &str) -> String {
    let mut out = String::new();
    let mut in_sub = false;
    for c in formula.chars() {
        let numeric = c.is_ascii_digit() || (in_sub && c == '.');
        if numeric && !in_sub {
            out.push_str("<sub>");
            in_sub = true;
        } else if !numeric && in_sub {
            out.push_str("</sub>");
            in_sub = false;
        }
        out.push_str(&escape_html(c.encode_utf8(&mut [0; 4])));
    }
    if in_sub {
        out.push_str("</sub>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_to_html() {
        assert_eq!(formula_to_html("Fe2O3"), "Fe<sub>2</sub>O<sub>3</sub>");
        assert_eq!(formula_to_html("Li0.5CoO2"), "Li<sub>0.5</sub>CoO<sub>2</sub>");
        assert_eq!(formula_to_html("<b>"), "&lt;b&gt;");
    }

    #[test]
    fn test_render_escapes_analysis() {
        let html = HtmlReportRenderer.render("Fe2O3", "Step 1: <script>\n\nStep 2 & done");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Fe<sub>2</sub>O<sub>3</sub></h1>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Step 2 &amp; done"));
        assert!(!html.contains("<script>"));
    }
}
