use crate::error::SettingsError;
use crate::model::{CheckConfig, DEFAULT_MAX_ERRORS, OutputFormat, RegocheckConfigV1};
use camino::{Utf8Path, Utf8PathBuf};
use globset::Glob;
use regocheck_ast::Capabilities;

/// Values given on the command line. A `false` flag means "not given", never "off".
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub format: Option<String>,
    pub max_errors: Option<usize>,
    /// Appended to the file's patterns.
    pub ignore: Vec<String>,
    pub bundle: bool,
    pub capabilities: Option<Utf8PathBuf>,
    pub schema: Option<Utf8PathBuf>,
    pub strict: bool,
    pub rego_v1: bool,
    pub v0_compatible: bool,
    pub v1_compatible: bool,
}

pub fn resolve_config(
    cfg: RegocheckConfigV1,
    overrides: Overrides,
) -> Result<CheckConfig, SettingsError> {
    let format = match overrides.format.as_deref().or(cfg.format.as_deref()) {
        Some(s) => s.parse()?,
        None => OutputFormat::default(),
    };

    let mut ignore = cfg.ignore;
    ignore.extend(overrides.ignore);
    validate_ignore(&ignore)?;

    let capabilities = match overrides
        .capabilities
        .or_else(|| cfg.capabilities.map(Utf8PathBuf::from))
    {
        Some(path) => Some(load_capabilities(&path)?),
        None => None,
    };

    Ok(CheckConfig {
        format,
        error_limit: overrides
            .max_errors
            .or(cfg.max_errors)
            .unwrap_or(DEFAULT_MAX_ERRORS),
        ignore,
        bundle_mode: overrides.bundle || cfg.bundle.unwrap_or(false),
        capabilities,
        schema: overrides.schema.or_else(|| cfg.schema.map(Utf8PathBuf::from)),
        strict: overrides.strict || cfg.strict.unwrap_or(false),
        rego_v1: overrides.rego_v1 || cfg.rego_v1.unwrap_or(false),
        v0_compatible: overrides.v0_compatible || cfg.v0_compatible.unwrap_or(false),
        v1_compatible: overrides.v1_compatible || cfg.v1_compatible.unwrap_or(false),
    })
}

fn validate_ignore(patterns: &[String]) -> Result<(), SettingsError> {
    for pattern in patterns {
        Glob::new(pattern).map_err(|source| SettingsError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Read a capabilities JSON document (custom built-ins included).
pub fn load_capabilities(path: &Utf8Path) -> Result<Capabilities, SettingsError> {
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::CapabilitiesRead {
        path: path.to_owned(),
        source,
    })?;
    Capabilities::from_json(&text).map_err(|source| SettingsError::CapabilitiesParse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config_toml;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = resolve_config(RegocheckConfigV1::default(), Overrides::default())
            .expect("resolve");
        assert_eq!(cfg, CheckConfig::default());
        assert_eq!(cfg.error_limit, 10);
    }

    #[test]
    fn flags_override_file_and_ignores_concatenate() {
        let file = parse_config_toml(
            r#"
format = "json"
max_errors = 3
ignore = ["vendor"]
strict = true
v0_compatible = true
"#,
        )
        .expect("parse");
        let overrides = Overrides {
            format: Some("pretty".to_string()),
            max_errors: Some(0),
            ignore: vec!["*_test.rego".to_string()],
            rego_v1: true,
            ..Overrides::default()
        };

        let cfg = resolve_config(file, overrides).expect("resolve");
        assert_eq!(cfg.format, OutputFormat::Pretty);
        assert_eq!(cfg.error_limit, 0);
        assert_eq!(cfg.ignore, vec!["vendor", "*_test.rego"]);
        assert!(cfg.strict);
        assert!(cfg.rego_v1 && cfg.v0_compatible);
        assert_eq!(cfg.rego_version(), regocheck_ast::RegoVersion::V0CompatV1);
    }

    #[test]
    fn unknown_keys_and_formats_are_rejected() {
        assert!(parse_config_toml("colour = true\n").is_err());

        let file = parse_config_toml("format = \"xml\"\n").expect("parse");
        let err = resolve_config(file, Overrides::default()).expect_err("bad format");
        assert!(matches!(err, SettingsError::UnknownFormat(f) if f == "xml"));
    }

    #[test]
    fn invalid_ignore_glob_is_rejected() {
        let overrides = Overrides {
            ignore: vec!["[".to_string()],
            ..Overrides::default()
        };
        let err = resolve_config(RegocheckConfigV1::default(), overrides).expect_err("bad glob");
        assert!(matches!(err, SettingsError::InvalidGlob { .. }));
    }

    #[test]
    fn capabilities_file_is_loaded_verbatim() {
        let tmp = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("caps.json")).expect("utf8 path");
        std::fs::write(
            &path,
            r#"{"builtins": [{"name": "custom.lookup", "decl": {"args": [{"type": "string"}]}}]}"#,
        )
        .expect("write caps");

        let overrides = Overrides {
            capabilities: Some(path.clone()),
            ..Overrides::default()
        };
        let cfg = resolve_config(RegocheckConfigV1::default(), overrides).expect("resolve");
        let caps = cfg.capabilities.expect("capabilities");
        assert_eq!(caps.builtins.len(), 1);
        assert_eq!(caps.builtin("custom.lookup").map(|b| b.arity()), Some(1));

        std::fs::write(&path, "{").expect("write caps");
        assert!(matches!(
            load_capabilities(&path),
            Err(SettingsError::CapabilitiesParse { .. })
        ));
    }

    #[test]
    fn config_model_schema_lists_every_key() {
        let schema = serde_json::to_value(schemars::schema_for!(RegocheckConfigV1))
            .expect("schema json");
        let props = schema["properties"].as_object().expect("properties");
        for key in [
            "format",
            "max_errors",
            "ignore",
            "bundle",
            "capabilities",
            "schema",
            "strict",
            "rego_v1",
            "v0_compatible",
            "v1_compatible",
        ] {
            assert!(props.contains_key(key), "missing {key}");
        }
    }
}
