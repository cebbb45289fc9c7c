use clap::CommandFactory;
use clap_complete::aot::{generate, Shell};
use std::io::BufWriter;

fn completions_for(shell: Shell) -> String {
    let mut buf = BufWriter::new(Vec::new());
    generate(shell, &mut projdeck::cli::Cli::command(), "projdeck", &mut buf);
    String::from_utf8(buf.into_inner().unwrap()).unwrap()
}

#[test]
fn completions_generate_for_common_shells() {
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        let output = completions_for(shell);
        assert!(!output.is_empty(), "{shell} completions should not be empty");
        assert!(
            output.contains("projdeck"),
            "{shell} completions should reference 'projdeck'"
        );
    }
}

#[test]
fn bash_completions_know_subcommands() {
    let output = completions_for(Shell::Bash);
    for sub in ["serve", "open", "projects", "validate"] {
        assert!(output.contains(sub), "missing subcommand {sub}");
    }
}
