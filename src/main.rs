// SPDX-License-Identifier: MIT
//
// lineal — demo REPL for the lineal-edit line editor.
//
// A tiny shell-shaped loop showing the three embedder hooks working
// together:
//
//   refresh handler → re-stylizes the buffer on every repaint (every
//                     'x' turns blue) and keeps a live counter in the
//                     prompt
//   tab completion  → completes "exit" when the last token prefixes it,
//                     otherwise offers two placeholder entries
//   history         → every accepted line is added and can be recalled
//                     with arrows or Ctrl-R
//
// Run it from a real terminal; diagnostics go to stderr through the
// tracing subscriber (RUST_LOG=lineal_edit=debug to see them).

use lineal_edit::{Color, Completion, Editor, Error, Span, SpanMode, Style, XtermColor};

fn highlight_prompt(count: usize) -> String {
    format!("I highlight x's ({count} so far): ")
}

fn completions_for(line: &str) -> Vec<Completion> {
    let last_token = line.rsplit(' ').next().unwrap_or("");

    if !last_token.is_empty() && "exit".starts_with(last_token) {
        let mut exit = Completion::new("exit");
        exit.invariant_offset = last_token.chars().count();
        exit.allow_commit_without_listing = true;
        return vec![exit];
    }

    let static_offset = last_token.chars().count();
    let mut first = Completion::new("lol no actual completions");
    first.static_offset = static_offset;
    let mut second = Completion::new("no really, no actual completions");
    second.static_offset = static_offset;
    vec![first, second]
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut editor = Editor::new();
    editor.set_enable_bracketed_paste(true);

    editor.set_refresh_handler(|editor| {
        let line = editor.line();
        editor.strip_styles();
        let mut count = 0;
        for (i, ch) in line.chars().enumerate() {
            if ch == 'x' {
                count += 1;
                editor.stylize(
                    Span {
                        start: i,
                        end: i + 1,
                        mode: SpanMode::Rune,
                    },
                    Style::foreground(Color::Xterm(XtermColor::Blue)),
                );
            }
        }
        editor.set_prompt(&highlight_prompt(count));
    });

    editor.set_tab_completion_handler(|editor| completions_for(&editor.line()));

    loop {
        match editor.get_line(&highlight_prompt(0)) {
            Ok(line) => {
                if line == "exit" {
                    break;
                }
                if !line.is_empty() {
                    editor.add_to_history(&line);
                }
                println!("you typed: {line}");
            }
            Err(Error::Canceled) => break,
            Err(error) => {
                eprintln!("error: {error}");
                break;
            }
        }
    }
}
