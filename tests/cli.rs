use clap::Parser;
use editgate::cli::{BackendArg, Cli, Commands, EditCmd, RespondArgs, StatusArg};

#[test]
fn edit_flag_parsing() {
    // Given
    let argv = vec![
        "egate",
        "--root",
        "/tmp/ws",
        "--prompt-backend",
        "file",
        "--confirm",
        "edit",
        "src/lib.rs",
        "--old",
        "foo",
        "--new",
        "bar",
        "--expected",
        "2",
    ];

    // When
    let cli = Cli::parse_from(argv);

    // Then
    assert!(cli.overrides.confirm);
    assert!(matches!(cli.overrides.prompt_backend, Some(BackendArg::File)));
    match cli.command {
        Commands::Edit(EditCmd { path, old, new, expected, .. }) => {
            assert_eq!(path, "src/lib.rs");
            assert_eq!(old, "foo");
            assert_eq!(new.as_deref(), Some("bar"));
            assert_eq!(expected, 2);
        }
        _ => panic!("expected Edit command"),
    }
}

#[test]
fn edit_defaults_to_create_with_single_match() {
    let cli = Cli::parse_from(["egate", "edit", "new.txt", "--new", "hello"]);
    match cli.command {
        Commands::Edit(EditCmd { old, expected, .. }) => {
            assert!(old.is_empty());
            assert_eq!(expected, 1);
        }
        _ => panic!("expected Edit command"),
    }
}

#[test]
fn edit_requires_replacement_text() {
    assert!(Cli::try_parse_from(["egate", "edit", "a.txt", "--old", "x"]).is_err());
}

#[test]
fn confirm_flags_conflict() {
    assert!(Cli::try_parse_from(["egate", "--confirm", "--no-confirm", "pending"]).is_err());
}

#[test]
fn respond_defaults_to_ok() {
    let cli = Cli::parse_from(["egate", "respond", "req-1"]);
    match cli.command {
        Commands::Respond(RespondArgs { request_id, status, remark }) => {
            assert_eq!(request_id, "req-1");
            assert!(matches!(status, StatusArg::Ok));
            assert!(remark.is_empty());
        }
        _ => panic!("expected Respond command"),
    }
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::parse_from(["egate", "pending", "--json", "--prompt-log", "/tmp/p.jsonl"]);
    assert!(cli.json);
    assert_eq!(
        cli.overrides.prompt_log.as_deref(),
        Some(std::path::Path::new("/tmp/p.jsonl"))
    );
    assert!(matches!(cli.command, Commands::Pending));
}
