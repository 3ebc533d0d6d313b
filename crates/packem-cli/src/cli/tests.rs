#[cfg(test)]
mod tests {
    use crate::cli::{BundlerChoice, Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("packem").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn build_defaults() {
        let cli = parse(&["build"]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert!(!args.watch);
        assert_eq!(args.bundler, BundlerChoice::Transpile);

        let overrides = args.overrides();
        assert_eq!(overrides.minify, None);
        assert_eq!(overrides.clean, None);
        assert_eq!(overrides.fail_on_warn, None);
    }

    #[test]
    fn build_flags_become_overrides() {
        let cli = parse(&[
            "build",
            "--minify",
            "--no-clean",
            "--no-fail-on-warn",
            "--out-dir",
            "lib",
            "--root",
            "packages/core",
        ]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.project.root, Some(PathBuf::from("packages/core")));

        let overrides = args.overrides();
        assert_eq!(overrides.minify, Some(true));
        assert_eq!(overrides.clean, Some(false));
        assert_eq!(overrides.fail_on_warn, Some(false));
        assert_eq!(overrides.out_dir, Some(PathBuf::from("lib")));
    }

    #[test]
    fn on_success_requires_watch() {
        let err = Cli::try_parse_from(["packem", "build", "--on-success", "node dist/index.js"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = parse(&["build", "--watch", "--on-success", "node dist/index.js"]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.on_success.as_deref(), Some("node dist/index.js"));
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["packem", "-v", "-q", "schema"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["entries", "--json", "--no-color"]);
        assert!(cli.no_color);
        assert!(matches!(cli.command, Command::Entries(ref args) if args.json));
    }
}
