//! Interactive version prompt.

use std::io::{self, BufRead, Write};

use muxtrim_core::fetch::choose_version;

/// Ask which version to download. A blank answer, or end of input, picks
/// `default`.
pub fn prompt_version<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    package_id: &str,
    default: &str,
) -> io::Result<String> {
    write!(output, "Version of {package_id} to download [{default}]: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(choose_version(&line, default))
}
