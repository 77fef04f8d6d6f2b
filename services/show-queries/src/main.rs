//! List the query paths a descriptor table (or a BUFR file) supports.
//!
//! Without `--file`, every subset sequence of the table is listed. With
//! `--file`, the subset variants actually present in the file's messages
//! are listed instead. `--file` may also name a directory, in which case
//! every file below it is scanned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bufr_common::ValueType;
use bufr_parser::{BufrFile, DescriptorTable, Fxy, Shape};
use bufr_query::list_queries;
use clap::Parser;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "show-queries")]
#[command(about = "List the mnemonic query paths available for BUFR subsets")]
struct Args {
    /// Descriptor table (YAML)
    #[arg(short, long, env = "BUFR_TABLE")]
    table: PathBuf,

    /// BUFR file or directory of files to scan for subset variants
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Only show this subset
    #[arg(short, long)]
    subset: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let table = DescriptorTable::from_yaml_path(&args.table)
        .with_context(|| format!("Failed to load table {}", args.table.display()))?;
    info!(
        elements = table.element_count(),
        sequences = table.sequence_count(),
        "Loaded descriptor table"
    );

    let mut variants = match &args.file {
        Some(path) => variants_in_files(&table, path)?,
        None => variants_in_table(&table),
    };
    if let Some(subset) = &args.subset {
        variants.retain(|shape| shape.root_mnemonic() == subset);
        if variants.is_empty() {
            bail!("Subset {} not found", subset);
        }
    }
    if variants.is_empty() {
        bail!("No subset variants found");
    }

    print!("{}", render(&variants));
    Ok(())
}

/// Every subset sequence the table defines.
fn variants_in_table(table: &DescriptorTable) -> Vec<Shape> {
    table
        .subset_roots()
        .into_iter()
        .filter_map(|root| match Shape::for_subset(table, &root.mnemonic) {
            Ok(shape) => Some(shape),
            Err(err) => {
                warn!(subset = %root.mnemonic, error = %err, "Cannot expand subset");
                None
            }
        })
        .collect()
}

/// Distinct descriptor lists found in the messages of `path`.
fn variants_in_files(table: &DescriptorTable, path: &Path) -> Result<Vec<Shape>> {
    let files: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut variants: BTreeMap<Vec<Fxy>, Shape> = BTreeMap::new();
    for file_path in &files {
        let file = BufrFile::open(file_path)
            .with_context(|| format!("Failed to read {}", file_path.display()))?;
        for item in file.messages() {
            let message = match item {
                Ok(message) => message,
                Err(err) => {
                    warn!(file = %file_path.display(), error = %err, "Skipping unreadable message");
                    continue;
                }
            };
            if message.is_table_message() {
                continue;
            }
            let descriptors = message.description.descriptors;
            if variants.contains_key(&descriptors) {
                continue;
            }
            match Shape::compile(table, &descriptors) {
                Ok(shape) => {
                    debug!(subset = %shape.root_mnemonic(), "Found subset variant");
                    variants.insert(descriptors, shape);
                }
                Err(err) => {
                    warn!(file = %file_path.display(), error = %err, "Cannot expand message")
                }
            }
        }
    }
    Ok(variants.into_values().collect())
}

fn type_name(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Int32 => "int",
        ValueType::UInt32 => "uint",
        ValueType::Int64 => "int64",
        ValueType::UInt64 => "uint64",
        ValueType::Float32 => "float",
        ValueType::Float64 => "double",
        ValueType::Text => "string",
    }
}

fn render(variants: &[Shape]) -> String {
    let mut out = String::new();
    out.push_str("Available subset variants:\n");
    for shape in variants {
        out.push_str(&format!("{}\n", shape.root_mnemonic()));
    }
    out.push_str(&format!(
        "Total number of subset variants found: {}\n\n",
        variants.len()
    ));

    for shape in variants {
        out.push_str(&format!("{}\n Queries:\n", shape.root_mnemonic()));
        for query in list_queries(shape) {
            out.push_str(&format!(
                "  {}d  {:<6}  {}\n",
                query.dims,
                type_name(query.value_type),
                query.path
            ));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{radiance_message, sample_radiances, sample_table, temp_test_dir, write_fixture};

    #[test]
    fn test_table_variants() {
        let table = sample_table();
        let variants = variants_in_table(&table);
        let names: Vec<&str> = variants.iter().map(|s| s.root_mnemonic()).collect();
        assert_eq!(names, vec!["NC021023", "NC000001"]);
    }

    #[test]
    fn test_file_variants_deduplicated() {
        let table = sample_table();
        let dir = temp_test_dir();
        let mut bytes = radiance_message(&sample_radiances());
        bytes.extend(radiance_message(&sample_radiances()[..1]));
        let path = write_fixture(&dir, "obs.bufr", bytes);

        let variants = variants_in_files(&table, &path).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].root_mnemonic(), "NC021023");

        let from_dir = variants_in_files(&table, dir.path()).unwrap();
        assert_eq!(from_dir.len(), 1);
    }

    #[test]
    fn test_render_lists_paths() {
        let table = sample_table();
        let text = render(&variants_in_table(&table)[..1]);
        assert!(text.contains("Total number of subset variants found: 1"));
        assert!(text.contains("  1d  float   */BRIT/TMBR"));
        assert!(text.contains("  0d  int     */SAID"));
    }
}
