//! Placeholder templates for release file names and URLs.
//!
//! Templates use Go-template style placeholders such as `{{.Version}}` or
//! `{{ .FileName }}`. They are parsed once, when a plugin is built, so an
//! unknown placeholder is reported before any network call happens.

use std::fmt;

use crate::{Error, Result};

/// A placeholder a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `{{.Version}}`
    Version,
    /// `{{.Platform}}`, the tool's OS name.
    Platform,
    /// `{{.Arch}}`, the tool's architecture name.
    Arch,
    /// `{{.FileName}}`, the rendered artifact file name.
    FileName,
    /// `{{.RepoOwner}}`
    RepoOwner,
    /// `{{.RepoName}}`
    RepoName,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "Version" => Some(Self::Version),
            "Platform" => Some(Self::Platform),
            "Arch" => Some(Self::Arch),
            "FileName" => Some(Self::FileName),
            "RepoOwner" => Some(Self::RepoOwner),
            "RepoName" => Some(Self::RepoName),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Version => "Version",
            Self::Platform => "Platform",
            Self::Arch => "Arch",
            Self::FileName => "FileName",
            Self::RepoOwner => "RepoOwner",
            Self::RepoName => "RepoName",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var(Placeholder),
}

/// Values available while rendering.
///
/// Fields left as `None` are unavailable; a template that needs one fails
/// to render.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    /// Resolved version, prefix already stripped.
    pub version: Option<&'a str>,
    /// Tool OS name.
    pub platform: Option<&'a str>,
    /// Tool architecture name.
    pub arch: Option<&'a str>,
    /// Rendered file name.
    pub file_name: Option<&'a str>,
    /// Repository owner.
    pub repo_owner: Option<&'a str>,
    /// Repository name.
    pub repo_name: Option<&'a str>,
}

impl<'a> TemplateVars<'a> {
    const fn get(&self, placeholder: Placeholder) -> Option<&'a str> {
        match placeholder {
            Placeholder::Version => self.version,
            Placeholder::Platform => self.platform,
            Placeholder::Arch => self.arch,
            Placeholder::FileName => self.file_name,
            Placeholder::RepoOwner => self.repo_owner,
            Placeholder::RepoName => self.repo_name,
        }
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] for an unclosed `{{`, an expression that
    /// is not a `.Name` field, or an unknown placeholder.
    pub fn parse(source: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::template(source, "unclosed '{{'"))?;
            let expr = after[..end].trim();
            let name = expr.strip_prefix('.').ok_or_else(|| {
                Error::template(source, format!("expected a field like .Version, got '{expr}'"))
            })?;
            let placeholder = Placeholder::parse(name)
                .ok_or_else(|| Error::template(source, format!("unknown placeholder '.{name}'")))?;
            parts.push(Part::Var(placeholder));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// The GitHub release asset URL for tags made of `tag_prefix` and the
    /// version.
    ///
    /// `tag_prefix` is kept as literal text even if it contains `{{`.
    #[must_use]
    pub fn github_release_asset(tag_prefix: &str) -> Self {
        let parts = vec![
            Part::Literal("https://github.com/".to_string()),
            Part::Var(Placeholder::RepoOwner),
            Part::Literal("/".to_string()),
            Part::Var(Placeholder::RepoName),
            Part::Literal(format!("/releases/download/{tag_prefix}")),
            Part::Var(Placeholder::Version),
            Part::Literal("/".to_string()),
            Part::Var(Placeholder::FileName),
        ];
        let source = format!(
            "https://github.com/{{{{.RepoOwner}}}}/{{{{.RepoName}}}}/releases/download/{tag_prefix}{{{{.Version}}}}/{{{{.FileName}}}}"
        );
        Self { source, parts }
    }

    /// The original template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders referenced by this template, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.parts.iter().filter_map(|p| match p {
            Part::Var(v) => Some(*v),
            Part::Literal(_) => None,
        })
    }

    /// Check that every referenced placeholder is among `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] naming the first disallowed placeholder.
    pub fn ensure_only(&self, allowed: &[Placeholder]) -> Result<()> {
        match self.placeholders().find(|p| !allowed.contains(p)) {
            Some(p) => Err(Error::template(
                &self.source,
                format!("placeholder '.{}' is not available here", p.name()),
            )),
            None => Ok(()),
        }
    }

    /// Substitute placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if a referenced value is not provided.
    pub fn render(&self, vars: &TemplateVars<'_>) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Var(p) => {
                    let value = vars.get(*p).ok_or_else(|| {
                        Error::template(
                            &self.source,
                            format!("no value for placeholder '.{}'", p.name()),
                        )
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Render a release file name.
///
/// # Errors
///
/// Fails if the template references anything besides version, platform
/// and arch.
pub fn render_file_name(template: &Template, version: &str, os: &str, arch: &str) -> Result<String> {
    template.render(&TemplateVars {
        version: Some(version),
        platform: Some(os),
        arch: Some(arch),
        ..TemplateVars::default()
    })
}

/// Render a download URL.
///
/// # Errors
///
/// Fails if the template references a placeholder without a value.
pub fn render_download_url(
    template: &Template,
    owner: &str,
    repo: &str,
    version: &str,
    file_name: &str,
) -> Result<String> {
    template.render(&TemplateVars {
        version: Some(version),
        file_name: Some(file_name),
        repo_owner: Some(owner),
        repo_name: Some(repo),
        ..TemplateVars::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_file_name() {
        let t = Template::parse("tool_{{.Version}}_{{.Platform}}_{{.Arch}}.tar.gz").unwrap();
        assert_eq!(
            render_file_name(&t, "1.2.3", "linux", "x86_64").unwrap(),
            "tool_1.2.3_linux_x86_64.tar.gz"
        );
    }

    #[test]
    fn test_render_download_url() {
        let t = Template::parse(
            "https://github.com/{{.RepoOwner}}/{{.RepoName}}/releases/download/v{{ .Version }}/{{.FileName}}",
        )
        .unwrap();
        assert_eq!(
            render_download_url(&t, "jqlang", "jq", "1.7.1", "jq-linux-amd64").unwrap(),
            "https://github.com/jqlang/jq/releases/download/v1.7.1/jq-linux-amd64"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let t = Template::parse("{{.Version}}-{{.Platform}}-{{.Arch}}").unwrap();
        let a = render_file_name(&t, "1", "linux", "arm64").unwrap();
        let b = render_file_name(&t, "1", "linux", "arm64").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["{{.Version", "{{Version}}", "{{.Unknown}}", "a{{}}b"] {
            assert!(
                matches!(Template::parse(bad), Err(Error::Template { .. })),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let t = Template::parse("{{.FileName}}").unwrap();
        let err = render_file_name(&t, "1.0.0", "linux", "amd64").unwrap_err();
        assert!(err.to_string().contains("FileName"));
    }

    #[test]
    fn test_ensure_only() {
        let t = Template::parse("{{.Version}}/{{.FileName}}").unwrap();
        assert!(t.ensure_only(&[Placeholder::Version, Placeholder::FileName]).is_ok());
        assert!(t.ensure_only(&[Placeholder::Version]).is_err());
        assert_eq!(
            t.placeholders().collect::<Vec<_>>(),
            vec![Placeholder::Version, Placeholder::FileName]
        );
    }

    #[test]
    fn test_literal_only() {
        let t = Template::parse("plain.zip").unwrap();
        assert_eq!(t.render(&TemplateVars::default()).unwrap(), "plain.zip");
        assert_eq!(t.to_string(), "plain.zip");
    }
}
