//! Rendering of parameterized environment descriptors.
//!
//! A descriptor template is plain text with `{{name}}` placeholders for the
//! values that change per run: the unique project tag, the path of the
//! generated application config, version pins. Rendering is a pure function of
//! (template, params).

use std::sync::LazyLock;

use regex::{Captures, Regex};

use common::error::{HarnessError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex compiles")
});

/// Substitute every `{{name}}` placeholder in `template` with its value from
/// `params`.
///
/// # Errors
///
/// Returns `HarnessError::Configuration` naming every placeholder that has no
/// matching param. A descriptor with a hole in it must never reach the
/// orchestration tool.
pub fn render(template: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut unresolved: Vec<String> = Vec::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match params.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => (*value).to_string(),
            None => {
                unresolved.push(name.to_string());
                String::new()
            }
        }
    });

    if unresolved.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(HarnessError::Configuration(format!(
            "unresolved template placeholders: {}",
            unresolved.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_named_placeholders() {
        let template = "project: {{project_tag}}\nconfig: {{config_path}}\n";
        let rendered = render(
            template,
            &[
                ("project_tag", "chaos_ab12cd34"),
                ("config_path", "tmp/zone-ab12cd34.conf"),
            ],
        )
        .unwrap();
        assert_eq!(
            rendered,
            "project: chaos_ab12cd34\nconfig: tmp/zone-ab12cd34.conf\n"
        );
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let rendered = render("tag={{ project_tag }}", &[("project_tag", "x")]).unwrap();
        assert_eq!(rendered, "tag=x");
    }

    #[test]
    fn unused_params_are_fine() {
        let rendered = render("static text", &[("project_tag", "x")]).unwrap();
        assert_eq!(rendered, "static text");
    }

    #[test]
    fn missing_param_is_a_configuration_error() {
        let err = render("image: {{image_tag}}", &[]).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
        assert!(err.to_string().contains("image_tag"));
    }

    #[test]
    fn reports_every_missing_placeholder() {
        let err = render("{{one}} {{two}}", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("one") && msg.contains("two"));
    }
}
