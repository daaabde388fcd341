//! Harness document assembly
//!
//! Builds the HTML page the browser loads at `/`: the Jasmine stylesheet,
//! the Jasmine bootstrap scripts, the spec loader, the spec files and the
//! vendor scripts, in that order, plus the serialized RequireJS
//! configuration the loader applies.
//!
//! Assembly is deterministic: the same configuration, spec list and
//! filesystem state always render byte-identical output.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use specrun_common::resource::is_remote;
use specrun_common::{Error, Resource, ResourceKind, Result, RunConfiguration};

/// Global the serialized RequireJS configuration is assigned to
pub const REQUIRE_CONFIG_GLOBAL: &str = "specrunRequireConfig";

/// Loader inlined when the framework root has no `specRunner.js`; it hands
/// [`REQUIRE_CONFIG_GLOBAL`] to RequireJS
pub const SPEC_LOADER: &str = include_str!("../assets/spec-loader.js");

/// Script that applies the RequireJS configuration ahead of the specs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecLoader {
    /// The project's own `<frameworkRoot>/specRunner.js`
    Script(Resource),
    /// [`SPEC_LOADER`], inlined
    Builtin,
}

impl SpecLoader {
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            SpecLoader::Script(resource) => Some(resource),
            SpecLoader::Builtin => None,
        }
    }
}

/// The assembled harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessDocument {
    pub stylesheet: Resource,
    pub bootstrap: Vec<Resource>,
    pub loader: SpecLoader,
    pub specs: Vec<Resource>,
    pub vendor: Vec<Resource>,
    /// Inlined RequireJS source
    pub require_js: Option<String>,
    /// JavaScript literal for the RequireJS configuration
    pub require_config: String,
}

impl HarnessDocument {
    /// Assemble the document for `spec_files`, kept in the order given
    pub fn assemble(config: &RunConfiguration, spec_files: &[PathBuf]) -> Result<Self> {
        let cwd = &config.cwd;
        let framework = &config.framework;

        let stylesheet = Resource::local(&framework.stylesheet(), cwd, ResourceKind::Stylesheet);

        let bootstrap = framework
            .scripts()
            .iter()
            .map(|path| Resource::local(path, cwd, ResourceKind::Script))
            .collect();

        let loader_path = framework.spec_loader();
        let loader = if loader_path.is_file() {
            SpecLoader::Script(Resource::local(&loader_path, cwd, ResourceKind::Script))
        } else {
            debug!("No {}, using the built-in loader", loader_path.display());
            SpecLoader::Builtin
        };

        let specs = spec_files
            .iter()
            .map(|path| Resource::local(path, cwd, ResourceKind::Script))
            .collect();

        let vendor = expand_vendor(&config.vendor, cwd)?;

        let require_js = match &config.require_js {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
                Error::TemplateSource {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let require_config = serialize_config(config.require_config.as_ref())?;

        Ok(Self {
            stylesheet,
            bootstrap,
            loader,
            specs,
            vendor,
            require_js,
            require_config,
        })
    }

    /// All referenced resources in document order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        std::iter::once(&self.stylesheet)
            .chain(self.bootstrap.iter())
            .chain(self.loader.resource())
            .chain(self.specs.iter())
            .chain(self.vendor.iter())
    }

    /// Render the HTML page
    pub fn render(&self) -> String {
        let mut html = String::new();

        html.push_str(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Jasmine Spec Runner</title>
  <link rel="shortcut icon" type="image/png" href="/favicon.ico">
"#,
        );

        html.push_str(&format!(
            "  <link rel=\"stylesheet\" type=\"{}\" href=\"{}\">\n",
            self.stylesheet.kind.content_type(),
            escape_attr(self.stylesheet.href()),
        ));

        if let Some(source) = &self.require_js {
            html.push_str("  <script type=\"text/javascript\">\n");
            html.push_str(&escape_script(source));
            html.push_str("\n  </script>\n");
        }

        html.push_str(&format!(
            "  <script type=\"text/javascript\">\n    var {} = {};\n  </script>\n",
            REQUIRE_CONFIG_GLOBAL, self.require_config
        ));

        for resource in &self.bootstrap {
            push_script_tag(&mut html, resource);
        }

        match &self.loader {
            SpecLoader::Script(resource) => push_script_tag(&mut html, resource),
            SpecLoader::Builtin => {
                html.push_str("  <script type=\"text/javascript\">\n");
                html.push_str(SPEC_LOADER);
                html.push_str("  </script>\n");
            }
        }

        for resource in self.specs.iter().chain(self.vendor.iter()) {
            push_script_tag(&mut html, resource);
        }

        html.push_str("</head>\n<body>\n</body>\n</html>\n");
        html
    }

    /// Write the rendered document, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, self.render())
        };
        write().map_err(|source| Error::HarnessWrite {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Wrote harness {} ({} specs, {} vendor scripts)",
            path.display(),
            self.specs.len(),
            self.vendor.len()
        );
        Ok(())
    }
}

/// Expand vendor entries in order.
///
/// URL entries pass through; everything else is a glob pattern evaluated
/// against `cwd`, its matches taken in the order the glob walk yields them.
pub fn expand_vendor(entries: &[String], cwd: &Path) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for entry in entries {
        if is_remote(entry) {
            resources.push(Resource::remote(entry.clone(), ResourceKind::Script));
            continue;
        }

        // The working directory is literal; only the entry is a pattern
        let base = glob::Pattern::escape(&cwd.to_string_lossy());
        let pattern = Path::new(&base).join(entry);
        let pattern = pattern.to_string_lossy();
        let mut matched = 0usize;
        for path in glob::glob(&pattern)? {
            let path = path?;
            resources.push(Resource::local(&path, cwd, ResourceKind::Script));
            matched += 1;
        }

        if matched == 0 {
            warn!("Vendor pattern {} matched no files", entry);
        } else {
            debug!("Vendor pattern {} matched {} file(s)", entry, matched);
        }
    }

    Ok(resources)
}

/// Serialize the RequireJS configuration as a JavaScript literal.
///
/// Four-space indented JSON with the characters that could end a
/// `<script>` element or a JS string escaped. Absent config is `undefined`.
pub fn serialize_config(value: Option<&Value>) -> Result<String> {
    let Some(value) = value else {
        return Ok("undefined".to_string());
    };

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    let json = String::from_utf8_lossy(&buf);

    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '/' => out.push_str("\\u002F"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn push_script_tag(html: &mut String, resource: &Resource) {
    html.push_str(&format!(
        "  <script type=\"{}\" src=\"{}\"></script>\n",
        resource.kind.content_type(),
        escape_attr(resource.href()),
    ));
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_script(source: &str) -> String {
    source.replace("</script", "<\\/script")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specrun_common::{Location, RunOptions, VendorSpec};
    use std::fs;

    fn config_in(cwd: &Path, options: RunOptions) -> RunConfiguration {
        options.into_configuration(cwd).unwrap()
    }

    #[test]
    fn test_resource_order() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        fs::create_dir_all(cwd.join("lib")).unwrap();
        fs::write(cwd.join("lib/b.js"), "").unwrap();
        fs::write(cwd.join("lib/a.js"), "").unwrap();

        let config = config_in(
            cwd,
            RunOptions {
                vendor: Some(VendorSpec::Many(vec![
                    "lib/*.js".to_string(),
                    "http://cdn.example.com/x.js".to_string(),
                ])),
                ..Default::default()
            },
        );
        let specs = vec![cwd.join("spec/z_spec.js"), cwd.join("spec/a_spec.js")];
        let doc = HarnessDocument::assemble(&config, &specs).unwrap();

        let hrefs: Vec<&str> = doc.resources().map(Resource::href).collect();
        assert_eq!(
            hrefs,
            vec![
                "vendor/jasmine-2.0/jasmine.css",
                "vendor/jasmine-2.0/jasmine.js",
                "vendor/jasmine-2.0/jasmine-html.js",
                "vendor/jasmine-2.0/console.js",
                "vendor/jasmine-2.0/boot.js",
                "spec/z_spec.js",
                "spec/a_spec.js",
                "lib/a.js",
                "lib/b.js",
                "http://cdn.example.com/x.js",
            ]
        );
        assert_eq!(
            doc.vendor[2].location,
            Location::Remote("http://cdn.example.com/x.js".to_string())
        );
    }

    #[test]
    fn test_vendor_globs_under_bracketed_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj[1]");
        fs::create_dir_all(cwd.join("lib")).unwrap();
        fs::write(cwd.join("lib/dep.js"), "").unwrap();

        let vendor = expand_vendor(&["lib/*.js".to_string()], &cwd).unwrap();
        let hrefs: Vec<&str> = vendor.iter().map(Resource::href).collect();
        assert_eq!(hrefs, vec!["lib/dep.js"]);
    }

    #[test]
    fn test_builtin_loader_applies_require_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            RunOptions {
                require_config: Some(json!({"baseUrl": "src"})),
                ..Default::default()
            },
        );
        let doc = HarnessDocument::assemble(&config, &[dir.path().join("spec/a_spec.js")]).unwrap();
        assert_eq!(doc.loader, SpecLoader::Builtin);

        let html = doc.render();
        let declared = html.find("var specrunRequireConfig = {").unwrap();
        let applied = html.find("global.require.config(config)").unwrap();
        let boot = html.find("vendor/jasmine-2.0/boot.js").unwrap();
        let spec = html.find("spec/a_spec.js").unwrap();
        assert!(declared < boot && boot < applied && applied < spec);
        assert!(html.contains(SPEC_LOADER));
    }

    #[test]
    fn test_project_loader_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/specRunner.js"), "").unwrap();

        let config = config_in(dir.path(), RunOptions::default());
        let doc = HarnessDocument::assemble(&config, &[dir.path().join("spec/a_spec.js")]).unwrap();
        let hrefs: Vec<&str> = doc.resources().map(Resource::href).collect();
        assert_eq!(hrefs[5], "vendor/specRunner.js");
        assert_eq!(hrefs[6], "spec/a_spec.js");
        assert!(!doc.render().contains(SPEC_LOADER));
    }

    #[test]
    fn test_render_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        fs::create_dir_all(cwd.join("lib")).unwrap();
        fs::write(cwd.join("lib/dep.js"), "").unwrap();

        let options = RunOptions {
            vendor: Some(VendorSpec::One("lib/*.js".to_string())),
            require_config: Some(json!({"baseUrl": "src", "paths": {"a": "lib/a"}})),
            ..Default::default()
        };
        let specs = vec![cwd.join("spec/one_spec.js")];

        let first = HarnessDocument::assemble(&config_in(cwd, options.clone()), &specs)
            .unwrap()
            .render();
        let second = HarnessDocument::assemble(&config_in(cwd, options), &specs)
            .unwrap()
            .render();
        assert_eq!(first, second);
        assert!(first.contains(r#"<script type="application/javascript" src="lib/dep.js"></script>"#));
    }

    #[test]
    fn test_serialize_config() {
        assert_eq!(serialize_config(None).unwrap(), "undefined");

        let literal = serialize_config(Some(&json!({"paths": {"x": "</script>"}}))).unwrap();
        assert_eq!(
            literal,
            "{\n    \"paths\": {\n        \"x\": \"\\u003C\\u002Fscript\\u003E\"\n    }\n}"
        );
    }

    #[test]
    fn test_missing_require_js_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            RunOptions {
                require_js: Some(PathBuf::from("missing/require.js")),
                ..Default::default()
            },
        );
        assert!(matches!(
            HarnessDocument::assemble(&config, &[]),
            Err(Error::TemplateSource { .. })
        ));
    }

    #[test]
    fn test_require_js_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("require.js"), "var requirejs = {};").unwrap();
        let config = config_in(
            dir.path(),
            RunOptions {
                require_js: Some(PathBuf::from("require.js")),
                ..Default::default()
            },
        );
        let html = HarnessDocument::assemble(&config, &[]).unwrap().render();
        assert!(html.contains("var requirejs = {};"));
        assert!(html.contains("var specrunRequireConfig = undefined;"));
    }

    #[test]
    fn test_write_to_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file"), "").unwrap();
        let config = config_in(dir.path(), RunOptions::default());
        let doc = HarnessDocument::assemble(&config, &[]).unwrap();
        assert!(matches!(
            doc.write_to(&dir.path().join("file/specRunner.html")),
            Err(Error::HarnessWrite { .. })
        ));
    }
}
