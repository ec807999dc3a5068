// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL over a live loader.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use tether_core::{Dependencies, Loader, ModuleValue};
use tokio::runtime::Handle;

use crate::manifest::Manifest;

/// REPL configuration constants
const HISTORY_FILE: &str = ".tether_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// How long `require` waits before reporting what is still pending
const REQUIRE_WAIT: Duration = Duration::from_secs(3);

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let rest = input.strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Apply a JSON module manifest"),
        ]
    }
}

/// A statement operating on the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement<'a> {
    /// `require a b c`
    Require(Vec<&'a str>),
    /// `define id [deps...] [= value]`
    Define {
        id: &'a str,
        deps: Vec<&'a str>,
        value: Option<&'a str>,
    },
    /// `package id member...` where a member is `id` or `key=id`
    Package { id: &'a str, members: Vec<&'a str> },
    /// `status [id]`
    Status(Option<&'a str>),
    /// `order`
    Order,
    /// `stalled`
    Stalled,
    /// `prefix [NAME=VALUE]`
    Prefix(Option<(&'a str, &'a str)>),
    /// `normalize id...`
    Normalize(Vec<&'a str>),
}

const STATEMENTS: &[(&str, &str)] = &[
    ("require <id>...", "Load modules and print their values"),
    ("define <id> [dep...] [= text]", "Declare a module"),
    ("package <id> [key=]<member>...", "Declare a package"),
    ("status [id]", "Show one module, or the summary"),
    ("order", "Show the resolution order"),
    ("stalled", "Show modules that have not loaded"),
    ("prefix [NAME=VALUE]", "List or set prefixes"),
    ("normalize <id>...", "Show how identifiers normalize"),
];

impl<'a> Statement<'a> {
    /// Parse a statement; `Err` carries a usage message
    pub fn parse(input: &'a str) -> Result<Self, String> {
        let (head, rest) = match input.trim().split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input.trim(), ""),
        };
        let words: Vec<&str> = rest.split_whitespace().collect();

        match head {
            "require" | "req" => {
                if words.is_empty() {
                    return Err("usage: require <id>...".into());
                }
                Ok(Statement::Require(words))
            }
            "define" | "def" => {
                let (decl, value) = match rest.split_once('=') {
                    Some((decl, value)) => (decl, Some(value.trim())),
                    None => (rest, None),
                };
                let mut decl = decl.split_whitespace();
                let id = decl
                    .next()
                    .ok_or_else(|| "usage: define <id> [dep...] [= text]".to_string())?;
                Ok(Statement::Define {
                    id,
                    deps: decl.collect(),
                    value,
                })
            }
            "package" | "pkg" => match words.split_first() {
                Some((&id, members)) if !members.is_empty() => Ok(Statement::Package {
                    id,
                    members: members.to_vec(),
                }),
                _ => Err("usage: package <id> [key=]<member>...".into()),
            },
            "status" | "get" => Ok(Statement::Status(words.first().copied())),
            "order" => Ok(Statement::Order),
            "stalled" => Ok(Statement::Stalled),
            "prefix" => match words.first() {
                None => Ok(Statement::Prefix(None)),
                Some(&word) => word
                    .split_once('=')
                    .filter(|(name, _)| !name.is_empty())
                    .map(|pair| Statement::Prefix(Some(pair)))
                    .ok_or_else(|| "usage: prefix NAME=VALUE".to_string()),
            },
            "normalize" | "norm" => {
                if words.is_empty() {
                    return Err("usage: normalize <id>...".into());
                }
                Ok(Statement::Normalize(words))
            }
            other => Err(format!("Unknown command '{}'; type .help", other)),
        }
    }
}

/// Turn `key=id` / `id` words into package members
fn package_members(words: &[&str]) -> Dependencies {
    if words.iter().all(|w| w.contains('=')) {
        Dependencies::named(words.iter().filter_map(|w| w.split_once('=')))
    } else {
        Dependencies::from(words.to_vec())
    }
}

/// Helper for rustyline: completes command words and registered ids
struct TetherHelper {
    loader: Loader,
}

impl TetherHelper {
    fn candidates(&self) -> Vec<String> {
        let mut words: Vec<String> = STATEMENTS
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next())
            .chain(
                ReplCommand::all_commands()
                    .iter()
                    .filter_map(|(usage, _)| usage.split_whitespace().next()),
            )
            .map(String::from)
            .collect();
        self.loader.with_registry(|registry| {
            words.extend(registry.modules().map(|node| node.id().to_string()));
        });
        words
    }
}

/// Start of the word under the cursor
fn word_start(line: &str) -> usize {
    line.rfind(char::is_whitespace).map(|i| i + 1).unwrap_or(0)
}

impl Completer for TetherHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .candidates()
            .into_iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair {
                replacement: candidate[word.len()..].to_string(),
                display: candidate,
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for TetherHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[word_start(line)..];
        if word.len() < 2 {
            return None;
        }

        self.candidates()
            .into_iter()
            .find(|candidate| candidate.starts_with(word) && candidate.len() > word.len())
            .map(|candidate| (&candidate[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for TetherHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        for (i, token) in line.split(' ').enumerate() {
            if i > 0 {
                result.push(' ');
            }
            if i == 0 {
                result.push_str(&token.bright_green().bold().to_string());
            } else {
                result.push_str(&highlight_id(token));
            }
        }
        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// Color the `kind!` prefix and `{PREFIX}` references of an identifier
fn highlight_id(token: &str) -> String {
    let (kind, rest) = match token.split_once('!') {
        Some((kind, rest)) => (Some(kind), rest),
        None => (None, token),
    };

    let mut out = String::new();
    if let Some(kind) = kind {
        out.push_str(&format!("{}!", kind).magenta().to_string());
    }
    let mut remaining = rest;
    while let Some(open) = remaining.find('{') {
        let Some(close) = remaining[open..].find('}') else {
            break;
        };
        out.push_str(&remaining[..open]);
        out.push_str(&(&remaining[open..=open + close]).yellow().to_string());
        remaining = &remaining[open + close + 1..];
    }
    out.push_str(remaining);
    out
}

impl Validator for TetherHelper {}

impl Helper for TetherHelper {}

/// The interactive REPL
pub struct Repl {
    loader: Loader,
    runtime: Handle,
    editor: Editor<TetherHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL over `loader`, blocking on `runtime` for requires
    pub fn new(loader: Loader, runtime: Handle) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(TetherHelper {
            loader: loader.clone(),
        }));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tether")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let _ = editor.load_history(&history_path);

        Ok(Self {
            loader,
            runtime,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "tether>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    if trimmed.starts_with('.') {
                        match ReplCommand::parse(trimmed) {
                            Some((cmd, arg)) => match self.execute_command(cmd, arg) {
                                CommandResult::Continue => continue,
                                CommandResult::Exit => break,
                            },
                            None => {
                                print_error(&format!("Unknown command '{}'", trimmed));
                                continue;
                            }
                        }
                    }

                    match Statement::parse(trimmed) {
                        Ok(statement) => self.execute(statement),
                        Err(message) => print_error(&message),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);

        println!();
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "Tether".bright_cyan().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!("  {}", "Runtime module resolver".dimmed());
        println!();
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!();
                println!("{}: {}", "tether".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
                println!("{}: {}", "tether-core".dimmed(), tether_core::VERSION);
                println!();
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_manifest(Path::new(path)),
                None => print_error(".load requires a file path"),
            },
        }
        CommandResult::Continue
    }

    fn load_manifest(&self, path: &Path) {
        match Manifest::from_file(path).and_then(|manifest| {
            manifest.apply(&self.loader)?;
            Ok(manifest.len())
        }) {
            Ok(count) => println!("{} {} declarations", "Loaded".green(), count),
            Err(e) => print_error(&format!("{:#}", e)),
        }
    }

    fn execute(&self, statement: Statement<'_>) {
        match statement {
            Statement::Require(ids) => self.require(ids),
            Statement::Define { id, deps, value } => {
                let value = value.map(ModuleValue::from);
                let result = self.loader.define(id, deps, move |values| match &value {
                    Some(value) => value.clone(),
                    None => ModuleValue::List(values.to_vec()),
                });
                match result {
                    Ok(future) if future.try_get().is_some() => {
                        println!("{} {}", "Loaded".green(), id.cyan())
                    }
                    Ok(_) => println!("{} {}", "Defined".green(), id.cyan()),
                    Err(e) => print_error(&e.to_string()),
                }
            }
            Statement::Package { id, members } => {
                match self.loader.define_package(id, package_members(&members), None) {
                    Ok(package) => println!("{} {}", "Package".green(), package.as_str().cyan()),
                    Err(e) => print_error(&e.to_string()),
                }
            }
            Statement::Status(Some(id)) => match self.loader.get(id) {
                Ok(info) => {
                    println!("{}", info);
                    if info.state == tether_core::LoadState::Loaded {
                        println!("  {}", format_value(&info.value));
                    }
                }
                Err(e) => print_error(&e.to_string()),
            },
            Statement::Status(None) => {
                let report = self.loader.report();
                println!("{}/{} modules loaded", report.loaded, report.modules);
            }
            Statement::Order => {
                for entry in self.loader.resolution_order() {
                    println!(
                        "  {:>3}. {} {}",
                        entry.sequence + 1,
                        entry.id.as_str().cyan(),
                        format!("{:?}", entry.via).to_lowercase().dimmed()
                    );
                }
            }
            Statement::Stalled => self.print_stalled(),
            Statement::Prefix(Some((name, value))) => {
                self.loader.set_prefix(name, value);
                println!("{} {{{}}} = {}", "Prefix".green(), name, value);
            }
            Statement::Prefix(None) => {
                let prefixes = self
                    .loader
                    .with_registry(|registry| registry.normalizer().prefixes().clone());
                for (name, value) in prefixes {
                    println!("  {} = {}", format!("{{{}}}", name).yellow(), value);
                }
            }
            Statement::Normalize(ids) => {
                for raw in ids {
                    match self.loader.normalize(raw) {
                        Ok(id) => println!(
                            "  {} {} {}",
                            id.kind.to_string().magenta(),
                            id.canonical.as_str().cyan(),
                            id.url.dimmed()
                        ),
                        Err(e) => print_error(&e.to_string()),
                    }
                }
            }
        }
    }

    fn require(&self, ids: Vec<&str>) {
        let future = match self.loader.require(ids.clone()) {
            Ok(future) => future,
            Err(e) => return print_error(&e.to_string()),
        };

        match self.runtime.block_on(tokio::time::timeout(REQUIRE_WAIT, future)) {
            Ok(Ok(ModuleValue::List(values))) => {
                for (id, value) in ids.iter().zip(values.iter()) {
                    println!("{} {}", id.cyan(), format_value(value));
                }
            }
            Ok(Ok(value)) => println!("{}", format_value(&value)),
            Ok(Err(e)) => print_error(&e.to_string()),
            Err(_) => {
                println!("{}", "Still pending".yellow().bold());
                self.print_stalled();
            }
        }
    }

    fn print_stalled(&self) {
        let stalled = self.loader.stalled();
        if stalled.is_empty() {
            println!("{}", "Nothing stalled".dimmed());
        }
        for stall in stalled {
            let chain: Vec<_> = stall.chain.iter().map(|id| id.as_str()).collect();
            println!(
                "  {} [{}] {} ({})",
                stall.id.as_str().cyan(),
                stall.state,
                chain.join(" -> ").dimmed(),
                stall.cause.to_string().yellow()
            );
        }
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn print_help() {
    println!();
    println!("{}", "Commands:".white().bold());
    println!();
    for (usage, desc) in STATEMENTS {
        println!("  {:32} {}", usage.cyan(), desc.dimmed());
    }
    println!();
    println!("{}", "REPL Commands:".white().bold());
    println!();
    for (cmd, desc) in ReplCommand::all_commands() {
        println!("  {:32} {}", cmd.cyan(), desc.dimmed());
    }
    println!();
    println!("{}", "Keyboard Shortcuts:".white().bold());
    println!();
    println!("  {:32} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
    println!("  {:32} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
    println!("  {:32} {}", "Tab".yellow(), "Complete commands and ids".dimmed());
    println!();
}

/// Format a module value for display with coloring
pub fn format_value(value: &ModuleValue) -> String {
    match value {
        ModuleValue::Undefined => "undefined".blue().dimmed().to_string(),
        ModuleValue::Evaluated => "[evaluated]".dimmed().to_string(),
        ModuleValue::Text(s) => format!("'{}'", s).green().to_string(),
        ModuleValue::Json(json) => json.to_string().yellow().to_string(),
        ModuleValue::Templates(templates) => {
            let names: Vec<_> = templates.keys().map(String::as_str).collect();
            format!("[templates: {}]", names.join(", ")).cyan().to_string()
        }
        ModuleValue::Stylesheet(style) => format!("[stylesheet {}]", style.url).magenta().to_string(),
        ModuleValue::Map(members) => {
            let entries: Vec<_> = members
                .iter()
                .map(|(key, value)| format!("{}: {}", key, format_value(value)))
                .collect();
            format!("{{ {} }}", entries.join(", "))
        }
        ModuleValue::List(values) => {
            let entries: Vec<_> = values.iter().map(format_value).collect();
            format!("[{}]", entries.join(", "))
        }
        ModuleValue::Native(_) => "[native]".magenta().to_string(),
    }
}

fn print_error(message: &str) {
    eprintln!("{}: {}", "Error".red().bold(), message);
}
