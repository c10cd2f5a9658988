//! Organism files: one instruction name per line.
//!
//! ```text
//! # default ancestor
//! h-alloc
//! nop-C      # filler
//! ```
//!
//! Everything after `#` is a comment; blank lines are ignored.

use crate::error::{IoError, Result};
use replicon_core::InstSet;
use replicon_data::Sequence;
use std::fmt::Write as _;
use std::path::Path;

/// Parses organism-file text against `inst_set`.
pub fn parse_genome(text: &str, inst_set: &InstSet) -> Result<Sequence> {
    let mut genome = Sequence::new();
    for (idx, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("").trim();
        let Some(name) = content.split_whitespace().next() else {
            continue;
        };
        let inst = inst_set
            .by_name(name)
            .ok_or_else(|| IoError::UnknownInstruction {
                name: name.to_string(),
                line: idx + 1,
            })?;
        genome.push(inst);
    }
    if genome.is_empty() {
        return Err(IoError::validation("Genome file contains no instructions"));
    }
    Ok(genome)
}

/// Renders `genome` in organism-file form, preceded by `header` lines as
/// comments.
#[must_use]
pub fn format_genome(genome: &Sequence, inst_set: &InstSet, header: &[&str]) -> String {
    let mut out = String::new();
    for line in header {
        let _ = writeln!(out, "# {}", line);
    }
    for &inst in genome {
        let _ = writeln!(out, "{}", inst_set.name(inst));
    }
    out
}

pub fn read_genome_file<P: AsRef<Path>>(path: P, inst_set: &InstSet) -> Result<Sequence> {
    let text = std::fs::read_to_string(&path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("reading genome from {:?}", path.as_ref()))
    })?;
    parse_genome(&text, inst_set)
        .map_err(|e| e.with_context(format!("parsing {:?}", path.as_ref())))
}

pub fn write_genome_file<P: AsRef<Path>>(
    path: P,
    genome: &Sequence,
    inst_set: &InstSet,
    header: &[&str],
) -> Result<()> {
    let text = format_genome(genome, inst_set, header);
    std::fs::write(&path, text).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("writing genome to {:?}", path.as_ref()))
    })?;
    tracing::debug!(path = ?path.as_ref(), len = genome.len(), "Genome written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicon_core::default_ancestor;

    #[test]
    fn test_parse_with_comments() {
        let set = InstSet::heads_default();
        let text = "# ancestor\n\nh-alloc\nnop-C   # filler\n  h-search\n";
        let genome = parse_genome(text, &set).unwrap();
        assert_eq!(genome.to_symbols(), "wcz");
    }

    #[test]
    fn test_unknown_instruction_reports_line() {
        let set = InstSet::heads_default();
        let err = parse_genome("h-alloc\nh-jump\n", &set).unwrap_err();
        match err {
            IoError::UnknownInstruction { name, line } => {
                assert_eq!(name, "h-jump");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_empty_file_rejected() {
        let set = InstSet::heads_default();
        assert!(parse_genome("# nothing\n", &set).is_err());
    }

    #[test]
    fn test_format_then_parse_preserves_sequence() {
        let set = InstSet::heads_default();
        let genome = default_ancestor(&set, 30);
        let text = format_genome(&genome, &set, &["seed"]);
        assert!(text.starts_with("# seed\nh-alloc\n"));
        assert_eq!(parse_genome(&text, &set).unwrap(), genome);
    }

    #[test]
    fn test_genome_file_on_disk() {
        let set = InstSet::heads_default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ancestor.org");
        let genome = default_ancestor(&set, 20);
        write_genome_file(&path, &genome, &set, &[]).unwrap();
        assert_eq!(read_genome_file(&path, &set).unwrap(), genome);
    }
}
