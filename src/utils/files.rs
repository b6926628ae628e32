use std::path::Path;

use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};

/// Read a line-oriented file into a list of strings, preserving order and
/// empty lines (blank lines are meaningful sentence separators in CoNLL
/// corpora)
pub async fn read_file(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let f = File::open(path.as_ref()).await?;
    let mut reader = io::BufReader::new(f).lines();

    let mut lines = Vec::new();
    while let Some(line) = reader.next_line().await? {
        lines.push(line);
    }

    Ok(lines)
}
