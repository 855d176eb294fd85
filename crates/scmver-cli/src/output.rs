use serde_json::json;

use scmver_domain::ScmVersion;

use crate::cli::OutputFormat;

/// Render the inference result for the terminal.
pub fn render_version(format: OutputFormat, version: &str, scm: &ScmVersion) -> String {
    match format {
        OutputFormat::Plain => version.to_owned(),
        OutputFormat::Json => {
            let payload = json!({
                "version": version,
                "metadata": {
                    "tag": scm.tag.to_string(),
                    "distance": scm.distance,
                    "node": scm.node,
                    "dirty": scm.dirty,
                    "branch": scm.branch,
                    "node_date": scm.node_date.map(|date| date.to_string()),
                    "preformatted": scm.preformatted,
                },
            });
            serde_json::to_string_pretty(&payload).expect("payload serializes")
        }
        OutputFormat::KeyValue => {
            let mut lines = vec![
                format!("version = {version}"),
                format!("tag = {}", scm.tag),
                format!("distance = {}", scm.distance),
                format!("node = {}", scm.node.as_deref().unwrap_or("")),
                format!("dirty = {}", scm.dirty),
            ];
            if let Some(branch) = &scm.branch {
                lines.push(format!("branch = {branch}"));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scmver_domain::{ScmVersionBuilder, TagVersion};
    use time::macros::datetime;

    fn sample() -> ScmVersion {
        ScmVersionBuilder::new(
            TagVersion::parse("1.2.3", true).unwrap(),
            datetime!(2024-01-01 00:00:00 UTC),
        )
        .distance(4)
        .node(Some("gdeadbee".into()))
        .branch(Some("main".into()))
        .build()
    }

    #[test]
    fn plain_prints_only_the_version() {
        assert_eq!(
            render_version(OutputFormat::Plain, "1.2.4.dev4+gdeadbee", &sample()),
            "1.2.4.dev4+gdeadbee"
        );
    }

    #[test]
    fn json_carries_the_metadata() {
        let rendered = render_version(OutputFormat::Json, "1.2.4.dev4+gdeadbee", &sample());
        let payload: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(payload["version"], "1.2.4.dev4+gdeadbee");
        assert_eq!(payload["metadata"]["distance"], 4);
        assert_eq!(payload["metadata"]["node"], "gdeadbee");
    }

    #[test]
    fn key_value_lists_fields() {
        let rendered = render_version(OutputFormat::KeyValue, "1.2.3", &sample());
        assert!(rendered.contains("version = 1.2.3"));
        assert!(rendered.contains("distance = 4"));
        assert!(rendered.contains("branch = main"));
    }
}
