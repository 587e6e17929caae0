//! Environment file materialization.
//!
//! Renders the project's env file from the configured list of required
//! variable names. Names without a provided value get a deterministic
//! placeholder so the file's shape never depends on which secrets were
//! available.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::EnvConfig;
use crate::platform::{PlatformError, SandboxHandle};

/// Placeholder value written for a required variable with no provided value.
pub fn placeholder(name: &str) -> String {
    format!("__MISSING_{name}__")
}

/// Render env file content for `required`, one `NAME=value` line each.
///
/// Returns the content and the names that fell back to placeholders.
pub fn render(required: &[String], provided: &HashMap<String, String>) -> (String, Vec<String>) {
    let mut content = String::new();
    let mut substituted = Vec::new();

    for name in required {
        let value = match provided.get(name) {
            Some(value) => value.clone(),
            None => {
                substituted.push(name.clone());
                placeholder(name)
            }
        };
        content.push_str(name);
        content.push('=');
        content.push_str(&value);
        content.push('\n');
    }

    (content, substituted)
}

/// Write the env file under `project_root` and report placeholder names.
pub async fn materialize(
    sandbox: &dyn SandboxHandle,
    project_root: &str,
    config: &EnvConfig,
    provided: &HashMap<String, String>,
) -> Result<Vec<String>, PlatformError> {
    let (content, substituted) = render(&config.required, provided);
    let path = format!(
        "{}/{}",
        project_root.trim_end_matches('/'),
        config.file_path
    );

    sandbox.write_file(&path, &content).await?;

    if substituted.is_empty() {
        debug!(path = %path, vars = config.required.len(), "Wrote env file");
    } else {
        warn!(
            path = %path,
            "Missing values for {} env vars, wrote placeholders: {}",
            substituted.len(),
            substituted.join(", ")
        );
    }

    Ok(substituted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeSandbox;

    fn required() -> Vec<String> {
        vec![
            "NEXT_PUBLIC_SUPABASE_URL".to_string(),
            "DATABASE_URL".to_string(),
        ]
    }

    #[test]
    fn test_render_uses_provided_values() {
        let mut provided = HashMap::new();
        provided.insert(
            "NEXT_PUBLIC_SUPABASE_URL".to_string(),
            "https://x.supabase.co".to_string(),
        );
        provided.insert(
            "DATABASE_URL".to_string(),
            "postgres://localhost/app".to_string(),
        );

        let (content, substituted) = render(&required(), &provided);

        assert_eq!(
            content,
            "NEXT_PUBLIC_SUPABASE_URL=https://x.supabase.co\nDATABASE_URL=postgres://localhost/app\n"
        );
        assert!(substituted.is_empty());
    }

    #[test]
    fn test_render_every_required_name_exactly_once() {
        let mut provided = HashMap::new();
        provided.insert(
            "DATABASE_URL".to_string(),
            "postgres://localhost/app".to_string(),
        );
        // Extras outside the required list are not written
        provided.insert("UNRELATED".to_string(), "x".to_string());

        let (content, substituted) = render(&required(), &provided);

        for name in required() {
            let occurrences = content
                .lines()
                .filter(|line| line.starts_with(&format!("{name}=")))
                .count();
            assert_eq!(occurrences, 1, "{name} written once");
        }
        assert!(!content.contains("UNRELATED"));
        assert_eq!(substituted, vec!["NEXT_PUBLIC_SUPABASE_URL"]);
        assert!(content.contains("NEXT_PUBLIC_SUPABASE_URL=__MISSING_NEXT_PUBLIC_SUPABASE_URL__"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let provided = HashMap::new();
        let (first, _) = render(&required(), &provided);
        let (second, _) = render(&required(), &provided);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_materialize_writes_env_file() {
        let sandbox = FakeSandbox::new();
        let config = EnvConfig::default();
        let mut provided = HashMap::new();
        for name in &config.required {
            provided.insert(name.clone(), format!("value-for-{name}"));
        }

        let substituted = materialize(&sandbox, "/home/user/app", &config, &provided)
            .await
            .unwrap();

        assert!(substituted.is_empty());
        let stored = sandbox.file("/home/user/app/.env.local").unwrap();
        for name in &config.required {
            assert!(stored.contains(&format!("{name}=value-for-{name}\n")));
        }
    }

    #[tokio::test]
    async fn test_materialize_reports_placeholders() {
        let sandbox = FakeSandbox::new();
        let config = EnvConfig::default();

        let substituted = materialize(&sandbox, "/home/user/app", &config, &HashMap::new())
            .await
            .unwrap();

        assert_eq!(substituted, config.required);
        let stored = sandbox.file("/home/user/app/.env.local").unwrap();
        assert!(stored.contains("DATABASE_URL=__MISSING_DATABASE_URL__\n"));
    }
}
