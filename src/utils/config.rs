//! Configuration struct parsing helper.

use crate::utils::LocksmithError;

/// Builds a config of type `$config_type`: starts from its `Default`, then
/// overlays the listed fields found in the optional TOML string. Keys in the
/// string that are not listed make the whole parse fail with
/// `LocksmithError::Config`, as does a value of the wrong type.
///
/// ```ignore
/// let config = parsed_config!(Some("nr_group = 4") => LockMgrConfig;
///                             topic_id, nr_group)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        let config_str: Option<&str> = $config_str;
        let mut config = <$config_type as Default>::default();
        match config_str {
            None => Ok(config),
            Some(text) => $crate::parse_config_table(text).and_then(|mut table| {
                $(
                    if let Some(value) = table.remove(stringify!($field)) {
                        config.$field = value.try_into().map_err(|e| {
                            $crate::LocksmithError::config(format!(
                                "field '{}': {}",
                                stringify!($field),
                                e
                            ))
                        })?;
                    }
                )+
                $crate::reject_leftover_fields(&table)?;
                Ok(config)
            }),
        }
    }};
}

/// Parses a TOML document into a table.
#[doc(hidden)]
pub fn parse_config_table(text: &str) -> Result<toml::Table, LocksmithError> {
    Ok(text.parse::<toml::Table>()?)
}

/// Fails naming every key still left in `table` after the known fields have
/// been taken out.
#[doc(hidden)]
pub fn reject_leftover_fields(table: &toml::Table) -> Result<(), LocksmithError> {
    if table.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = table.keys().map(String::as_str).collect();
    Err(LocksmithError::config(format!(
        "invalid field name(s) in config: {}",
        names.join(", ")
    )))
}

#[cfg(test)]
mod config_tests {
    use crate::utils::LocksmithError;

    #[derive(Debug, PartialEq)]
    struct TestConfig {
        abc: u16,
        hij: String,
        lmn: bool,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            TestConfig {
                abc: 7,
                hij: "lock".into(),
                lmn: false,
            }
        }
    }

    #[test]
    fn parse_from_none() -> Result<(), LocksmithError> {
        let config = parsed_config!(None => TestConfig; abc, hij, lmn)?;
        let ref_config: TestConfig = Default::default();
        assert_eq!(config, ref_config);
        Ok(())
    }

    #[test]
    fn parse_from_partial() -> Result<(), LocksmithError> {
        let config_str = Some("hij = 'Nice'\nlmn = true");
        let config = parsed_config!(config_str => TestConfig; hij, lmn)?;
        let ref_config = TestConfig {
            abc: 7,
            hij: "Nice".into(),
            lmn: true,
        };
        assert_eq!(config, ref_config);
        Ok(())
    }

    #[test]
    fn parse_invalid_field() {
        let config_str = Some("xyz = 999");
        assert!(matches!(
            parsed_config!(config_str => TestConfig; abc),
            Err(LocksmithError::Config(_))
        ));
    }

    #[test]
    fn parse_wrong_type() {
        let config_str = Some("abc = 'seven'");
        assert!(parsed_config!(config_str => TestConfig; abc).is_err());
    }

    #[test]
    fn parse_names_every_unknown_field() {
        let config_str = Some("abc = 1\nxyz = 2\nqrs = 3");
        match parsed_config!(config_str => TestConfig; abc, hij, lmn) {
            Err(LocksmithError::Config(msg)) => {
                assert!(msg.contains("qrs") && msg.contains("xyz"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_wrong_type_names_field() {
        let config_str = Some("lmn = 3");
        match parsed_config!(config_str => TestConfig; abc, lmn) {
            Err(LocksmithError::Config(msg)) => assert!(msg.contains("lmn")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
