//! Answer HTML → Markdown with cleanup passes.
//!
//! Each pass is `&str -> String`, applied in order. Collected answers are
//! embedded below a per-question heading, so their own headings are pushed
//! down to level 4 or deeper.

use std::sync::LazyLock;

use errorpress_shared::{PressError, Result};
use regex::Regex;
use url::Url;

/// Lowest heading level an embedded answer may use.
const MIN_EMBEDDED_HEADING: usize = 4;

/// Convert one answer body to Markdown. Relative links resolve against `base`.
pub fn answer_to_markdown(html: &str, base: Option<&Url>) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript", "svg"])
        .build();

    let raw = converter
        .convert(html)
        .map_err(|e| PressError::parse(format!("answer conversion failed: {e}")))?;

    Ok(run_pipeline(&raw, base))
}

pub(crate) fn run_pipeline(md: &str, base: Option<&Url>) -> String {
    let mut out = demote_headings(md);
    out = strip_language_prefixes(&out);
    out = absolutize_links(&out, base);
    out = trim_line_ends(&out);
    out = collapse_blank_lines(&out);
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Push every heading down so none is shallower than `MIN_EMBEDDED_HEADING`.
/// Lines inside fenced code are left alone.
fn demote_headings(md: &str) -> String {
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                return line.to_string();
            }
            match HEADING.captures(line) {
                Some(caps) => {
                    let level = caps[1].len().max(MIN_EMBEDDED_HEADING).min(6);
                    format!("{} {}", "#".repeat(level), &caps[2])
                }
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// StackOverflow marks fences as `lang-js`; keep only the language.
fn strip_language_prefixes(md: &str) -> String {
    static FENCE_LANG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-)([\w+#-]+)").expect("valid regex")
    });
    FENCE_LANG.replace_all(md, "```$1").into_owned()
}

/// Rewrite site-relative links (`/questions/123`) to absolute ones.
fn absolutize_links(md: &str, base: Option<&Url>) -> String {
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\]\((/[^)\s]*)\)").expect("valid regex"));

    let Some(base) = base else {
        return md.to_string();
    };
    LINK.replace_all(md, |caps: &regex::Captures| match base.join(&caps[1]) {
        Ok(url) => format!("]({url})"),
        Err(_) => caps[0].to_string(),
    })
    .into_owned()
}

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// At most one blank line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    BLANKS.replace_all(md, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_are_demoted_outside_code() {
        let input = "# Fix\n\n```bash\n# not a heading\n```\n\n##### Deep";
        assert_eq!(
            demote_headings(input),
            "#### Fix\n\n```bash\n# not a heading\n```\n\n##### Deep"
        );
    }

    #[test]
    fn language_prefixes_are_removed() {
        assert_eq!(
            strip_language_prefixes("```lang-powershell\nGet-Service\n```"),
            "```powershell\nGet-Service\n```"
        );
    }

    #[test]
    fn relative_links_become_absolute() {
        let base = Url::parse("https://stackoverflow.com").expect("url");
        let md = "See [this](/questions/42/why) and [docs](https://learn.microsoft.com/x).";
        assert_eq!(
            absolutize_links(md, Some(&base)),
            "See [this](https://stackoverflow.com/questions/42/why) and [docs](https://learn.microsoft.com/x)."
        );
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(trim_line_ends("a  \nb\t"), "a\nb");
    }

    #[test]
    fn converts_answer_html() {
        let html = r#"<h2>Reset the cache</h2>
<p>Run the following as <strong>administrator</strong>:</p>
<pre><code>net stop wuauserv
net start wuauserv
</code></pre>
<p>Details in <a href="/a/123">this answer</a>.</p>"#;
        let base = Url::parse("https://stackoverflow.com").expect("url");
        let md = answer_to_markdown(html, Some(&base)).expect("convert");
        assert!(md.starts_with("#### Reset the cache"));
        assert!(md.contains("**administrator**"));
        assert!(md.contains("net stop wuauserv"));
        assert!(md.contains("(https://stackoverflow.com/a/123)"));
        assert!(!md.contains("\n\n\n"));
    }
}
