//! Shell completion generation for copyexport
//!
//! This module generates completion scripts for bash, zsh and fish, with
//! dynamic completion of export keys for `run`, `validate` and `render`.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigurationError, Result};

const BIN: &str = "copyexport";

/// Generate shell completion script on stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish)
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    let mut stdout = io::stdout().lock();
    write_completion(shell, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ConfigurationError::InvalidValue {
            field: "shell".to_string(),
            value: format!("{shell_name} (supported: bash, zsh, fish)"),
        }
        .into()),
    }
}

/// Write the generated script plus the export key completion for `shell`
fn write_completion<W: Write>(shell: Shell, out: &mut W) -> Result<()> {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN, &mut buffer);
    out.write_all(&buffer)?;

    let extra = match shell {
        Shell::Bash => BASH_KEYS,
        Shell::Zsh => ZSH_KEYS,
        _ => FISH_KEYS,
    };
    out.write_all(extra.as_bytes())?;
    Ok(())
}

const BASH_KEYS: &str = r#"
# Export keys for run, validate and render
_copyexport_keys() {
    copyexport list --keys 2>/dev/null
}

_copyexport_enhanced() {
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "run" || "$prev" == "validate" || "$prev" == "render" ]]; then
        COMPREPLY=($(compgen -W "$(_copyexport_keys)" -- "$cur"))
        return 0
    fi

    _copyexport "$@"
}

complete -F _copyexport_enhanced copyexport
"#;

const ZSH_KEYS: &str = r#"
# Export keys for run, validate and render
_copyexport_keys() {
    local -a keys
    keys=(${(f)"$(copyexport list --keys 2>/dev/null)"})
    _describe 'exports' keys
}

_copyexport_enhanced() {
    case ${words[CURRENT-1]} in
        run|validate|render)
            _copyexport_keys
            return 0
            ;;
    esac
    _copyexport "$@"
}

compdef _copyexport_enhanced copyexport
"#;

const FISH_KEYS: &str = r#"
# Export keys for run, validate and render
complete -c copyexport -n "__fish_seen_subcommand_from run validate render" -f -a "(copyexport list --keys 2>/dev/null)" -d "Export key"
"#;
