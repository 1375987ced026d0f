//! CLI error display with actionable messages and exit-code selection.

use sotto_core::SottoError;

/// Display an error to stderr: message, context details, numbered
/// suggestions, plus a targeted hint for common cases.
pub fn display_error(err: &SottoError) {
    eprintln!("{}", err.format_error());

    match err {
        SottoError::DaemonNotRunning(_) => {
            eprintln!();
            eprintln!("Hint: start the daemon with:");
            eprintln!("  sotto daemon start");
        }
        SottoError::Dependency(_) => {
            eprintln!();
            eprintln!("Hint: check external dependencies:");
            eprintln!("  ffmpeg -version");
            eprintln!("  sotto daemon status");
        }
        SottoError::Configuration(_) => {
            eprintln!();
            eprintln!("Hint: for valid options, run:");
            eprintln!("  sotto --help");
        }
        _ => {}
    }
}

/// Select the process exit code for an error.
///
/// 0 success, 1 runtime failure, 2 user-input/config error, 3 engine or
/// dependency initialisation error, 130 user interruption.
pub fn exit_code(err: &SottoError) -> i32 {
    if let SottoError::Io(io_err) = err {
        if io_err.kind() == std::io::ErrorKind::Interrupted {
            return 130;
        }
    }
    err.exit_code()
}
