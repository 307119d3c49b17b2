use anyhow::{Context, Result};
use handlebars::{Handlebars, no_escape};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct VersionModuleContext<'a> {
    pub version: &'a str,
}

const VERSION_MODULE_TEMPLATE: &str = r#"# pylint: disable=invalid-name

# THIS IS AN AUTOGENERATED FILE. DO NOT TOUCH!

__version__ = "{{version}}"
"#;

/// Source of the generated `__version__` module.
pub fn render_version_module(context: &VersionModuleContext<'_>) -> Result<String> {
    render_template("version-module", VERSION_MODULE_TEMPLATE, context)
}

fn render_template<T: Serialize>(name: &str, template_source: &str, context: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(no_escape);
    handlebars
        .register_template_string(name, template_source)
        .with_context(|| format!("Failed to register template `{name}`."))?;

    handlebars
        .render(name, context)
        .with_context(|| format!("Failed to render template `{name}`."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_version_module_without_escaping() {
        let rendered = render_version_module(&VersionModuleContext {
            version: "22.4.1.dev1",
        })
        .unwrap();

        assert!(rendered.starts_with("# pylint: disable=invalid-name\n\n"));
        assert!(rendered.contains("DO NOT TOUCH!"));
        assert!(rendered.ends_with("__version__ = \"22.4.1.dev1\"\n"));
    }
}
