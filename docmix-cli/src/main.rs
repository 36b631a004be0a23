use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docmix::{DocInfo, FieldInfo, FieldMode, TemplateBinder};
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "docmix",
    about = "Fill PDF form templates and emit the final document",
    version,
    author
)]
struct Cli {
    /// Log what the engine does (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a template and write the result
    Fill {
        /// Template PDF (path or file://, http://, https:// URL)
        template: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Text binding, repeatable (e.g. --text sacado="Maria da Silva")
        #[arg(short, long = "text", value_name = "NAME=VALUE")]
        texts: Vec<String>,

        /// JSON object of text bindings
        #[arg(long = "texts", value_name = "FILE")]
        texts_file: Option<PathBuf>,

        /// Image binding, repeatable (e.g. --image logo=logo.png)
        #[arg(short, long = "image", value_name = "NAME=PATH")]
        images: Vec<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        keywords: Option<String>,

        #[arg(long)]
        creator: Option<String>,

        /// Draw the fields into the page instead of removing them
        #[arg(long)]
        flatten: bool,

        /// Write a classic cross-reference table and plain streams
        #[arg(long)]
        no_compression: bool,

        /// Ask viewers to show the title (true) or the file name (false)
        #[arg(long, value_name = "BOOL")]
        display_title: Option<bool>,
    },

    /// List the form fields of a template
    Fields {
        /// Template PDF (path or URL)
        template: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the document information of a PDF
    Info {
        /// Input PDF file
        input: PathBuf,

        /// Print JSON instead of key/value lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct FieldReport {
    name: String,
    kind: &'static str,
    value: Option<String>,
    positions: Vec<PositionReport>,
}

/// Page number and `[x1, y1, x2, y2]` of one widget.
#[derive(Serialize)]
struct PositionReport {
    page: u32,
    rect: [f64; 4],
}

impl From<&FieldInfo> for FieldReport {
    fn from(field: &FieldInfo) -> Self {
        Self {
            name: field.name.clone(),
            kind: field.kind.as_str(),
            value: field.value.clone(),
            positions: field
                .positions
                .iter()
                .map(|p| PositionReport {
                    page: p.page,
                    rect: [
                        p.rect.lower_left.x,
                        p.rect.lower_left.y,
                        p.rect.upper_right.x,
                        p.rect.upper_right.y,
                    ],
                })
                .collect(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "docmix=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fill {
            template,
            output,
            texts,
            texts_file,
            images,
            title,
            author,
            subject,
            keywords,
            creator,
            flatten,
            no_compression,
            display_title,
        } => {
            let mut binder = open_template(&template)?;

            if let Some(path) = texts_file {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let bindings: BTreeMap<String, String> = serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not a JSON object of strings", path.display()))?;
                for (name, value) in bindings {
                    binder.put_text(name, value)?;
                }
            }
            for binding in &texts {
                let (name, value) = parse_binding(binding)?;
                binder.put_text(name, value)?;
            }
            for binding in &images {
                let (name, path) = parse_binding(binding)?;
                let image = image::open(path)
                    .with_context(|| format!("Failed to read image {path}"))?;
                binder.put_image(name, image)?;
            }

            binder
                .title(title.as_deref())
                .author(author.as_deref())
                .subject(subject.as_deref())
                .keywords(keywords.as_deref())
                .creator(creator.as_deref());
            binder
                .field_mode(if flatten {
                    FieldMode::Flatten
                } else {
                    FieldMode::Remove
                })
                .with_full_compression(!no_compression);
            if let Some(display) = display_title {
                binder.display_doc_title(display);
            }

            debug!("{:?}", binder);
            let written = binder.to_file(&output)?;
            println!("✓ Filled template written to {}", written.display());
        }

        Commands::Fields { template, json } => {
            let binder = open_template(&template)?;
            let fields = binder.fields()?;

            if json {
                let report: Vec<FieldReport> = fields.iter().map(FieldReport::from).collect();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if fields.is_empty() {
                println!("No form fields");
            } else {
                println!("{:<32} {:<10} {:<8} Value", "Name", "Kind", "Pages");
                for field in &fields {
                    let report = FieldReport::from(field);
                    let pages = report
                        .positions
                        .iter()
                        .map(|p| p.page.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    println!(
                        "{:<32} {:<10} {:<8} {}",
                        report.name,
                        report.kind,
                        pages,
                        report.value.unwrap_or_default()
                    );
                }
            }
        }

        Commands::Info { input, json } => {
            let bytes =
                fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let info = DocInfo::from_pdf(&bytes)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info.to_map())?);
            } else if info.is_empty() {
                println!("No document information");
            } else {
                for (key, value) in info.to_map() {
                    println!("{key:<14} {value}");
                }
            }
        }
    }

    Ok(())
}

fn open_template(template: &str) -> Result<TemplateBinder> {
    let binder = if template.contains("://") {
        TemplateBinder::from_url(template)?
    } else {
        let path = Path::new(template);
        if !path.exists() {
            bail!("Template not found: {}", path.display());
        }
        TemplateBinder::from_path(path)?
    };
    Ok(binder)
}

/// Splits `NAME=VALUE` at the first `=`.
fn parse_binding(binding: &str) -> Result<(&str, &str)> {
    match binding.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => bail!("Invalid binding '{}', expected NAME=VALUE", binding),
    }
}
