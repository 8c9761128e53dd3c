use draftsman::config::{BackendKind, Settings};
use draftsman::tools::{catalog, Permissions};

#[test]
fn test_settings_validation_rejects_blank_api_base_url() {
    let settings = Settings {
        api_base_url: "   ".to_string(),
        ..Settings::default()
    };
    assert!(settings.validate().is_err());
}

#[test]
fn test_settings_validation_rejects_unterminated_cli_quote() {
    let settings = Settings {
        backend: BackendKind::Cli,
        cli_extra_args: "--profile 'oops".to_string(),
        ..Settings::default()
    };
    assert!(settings.validate().is_err());
}

#[test]
fn test_settings_defaults_validate() {
    assert!(Settings::default().validate().is_ok());

    let cli = Settings {
        backend: BackendKind::Cli,
        ..Settings::default()
    };
    assert!(cli.validate().is_ok());
}

#[test]
fn test_catalog_is_exactly_determined_by_the_permission_tuple() {
    let names = |permissions: Permissions| -> Vec<String> {
        let mut names: Vec<String> = catalog(&permissions)
            .into_iter()
            .map(|tool| tool.function.name)
            .collect();
        names.sort();
        names
    };

    assert!(names(Permissions::default()).is_empty());
    assert_eq!(
        names(Permissions {
            read: true,
            ..Permissions::default()
        }),
        ["list_files", "read_file"]
    );
    assert_eq!(
        names(Permissions {
            write: true,
            ..Permissions::default()
        }),
        ["delete_file", "write_file"]
    );
    assert_eq!(
        names(Permissions {
            execute: true,
            ..Permissions::default()
        }),
        ["run_command"]
    );
    assert_eq!(
        names(Permissions {
            read: true,
            write: true,
            execute: true,
        }),
        [
            "delete_file",
            "list_files",
            "read_file",
            "run_command",
            "write_file",
        ]
    );
}
