use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser as ClapParser;

use psh::parser::{LexerOptions, Parser};
use psh::Shell;

#[derive(ClapParser)]
#[command(name = "psh")]
#[command(about = "A bash-compatible POSIX shell")]
#[command(version)]
struct Cli {
    /// Execute the given command string
    #[arg(short = 'c', value_name = "CMD")]
    command: Option<String>,

    /// Read commands from standard input
    #[arg(short = 's')]
    stdin: bool,

    /// Force interactive mode
    #[arg(short = 'i')]
    interactive: bool,

    /// Skip the rc file on interactive startup
    #[arg(long = "norc")]
    norc: bool,

    /// Use FILE instead of ~/.pshrc
    #[arg(long = "rcfile", value_name = "FILE")]
    rcfile: Option<PathBuf>,

    /// Print the parsed AST and exit
    #[arg(long = "debug-ast")]
    debug_ast: bool,

    /// Print the token stream and exit
    #[arg(long = "debug-tokens")]
    debug_tokens: bool,

    /// Trace command execution (like set -x)
    #[arg(long = "debug-exec")]
    debug_exec: bool,

    /// Parse without executing; exit 0 if the input is well formed
    #[arg(long = "validate")]
    validate: bool,

    /// Re-print the parsed input in canonical form
    #[arg(long = "format")]
    format: bool,

    /// Print parse metrics as JSON
    #[arg(long = "metrics")]
    metrics: bool,

    /// Script file to run
    #[arg(value_name = "SCRIPT")]
    script: Option<String>,

    /// Arguments for the script
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    // Analysis modes work on whichever source the normal rules select.
    if cli.debug_ast || cli.debug_tokens || cli.validate || cli.format || cli.metrics {
        std::process::exit(run_analysis(&cli));
    }

    let stdin_tty = std::io::stdin().is_terminal();
    let interactive =
        cli.interactive || (cli.command.is_none() && cli.script.is_none() && stdin_tty);

    let mut shell = Shell::new(interactive);
    if cli.debug_exec {
        shell.interp.state.options.xtrace = true;
    }

    if interactive && !cli.norc {
        shell.load_rc(cli.rcfile.as_deref());
    }

    let code = if let Some(command) = &cli.command {
        // With -c, the first operand becomes $0.
        let (name, args) = match &cli.script {
            Some(name) => (name.as_str(), cli.args.as_slice()),
            None => ("psh", &[][..]),
        };
        shell.run_command(command, name, args)
    } else if let Some(script) = &cli.script {
        shell.run_script_file(script, &cli.args)
    } else if interactive {
        shell.repl()
    } else {
        // Non-tty stdin, or explicit -s.
        let _ = cli.stdin;
        shell.run_stdin()
    };

    std::process::exit(code & 0xff);
}

fn read_source(cli: &Cli) -> Result<String, i32> {
    if let Some(command) = &cli.command {
        return Ok(command.clone());
    }
    if let Some(script) = &cli.script {
        return std::fs::read_to_string(script).map_err(|e| {
            eprintln!("psh: {}: {}", script, e);
            1
        });
    }
    use std::io::Read;
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text).map_err(|_| 1)?;
    Ok(text)
}

fn run_analysis(cli: &Cli) -> i32 {
    let source = match read_source(cli) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let options = LexerOptions { extglob: true, ..Default::default() };

    if cli.debug_tokens {
        match psh::parser::Lexer::with_options(&source, options.clone()).tokenize() {
            Ok(output) => {
                for token in &output.tokens {
                    println!(
                        "{}:{}\t{}\t{:?}",
                        token.line,
                        token.column,
                        token.token_type.as_str(),
                        token.value
                    );
                }
                return 0;
            }
            Err(e) => {
                eprintln!("psh: {}", e);
                return 2;
            }
        }
    }

    let mut parser = Parser::with_options(options);
    let script = match parser.parse(&source) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("psh: {}", e);
            return 2;
        }
    };

    if cli.debug_ast {
        println!("{:#?}", script);
    }
    if cli.format {
        for statement in &script.statements {
            println!("{}", statement);
        }
    }
    if cli.metrics {
        let pipelines: usize = script.statements.iter().map(|s| s.pipelines.len()).sum();
        let commands: usize = script
            .statements
            .iter()
            .flat_map(|s| &s.pipelines)
            .map(|p| p.commands.len())
            .sum();
        let metrics = serde_json::json!({
            "statements": script.statements.len(),
            "pipelines": pipelines,
            "commands": commands,
            "bytes": source.len(),
        });
        println!("{}", metrics);
    }
    0
}
