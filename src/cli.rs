//! CLI domain: parsing, command routing, and presentation.
//!
//! The `strata` binary inspects layered configuration chains: listing
//! declared sections, printing a section's effective content after the
//! chain merge, and validating whole chains with positioned diagnostics.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::activation::TypeRegistry;
use crate::configuration::Configuration;
use crate::declaration::{DeclNode, GroupDecl, SectionDecl};
use crate::element::SaveMode;
use crate::host::{FileHost, LevelStream};
use crate::sections::register_builtins;
use crate::xml::XmlWriter;
use crate::ConfigLevel;

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Inspect layered XML configuration chains"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List declared sections, groups, and location blocks
    Sections {
        /// Chain files, outermost first (machine, application, users)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a section's effective content after the chain merge
    Get {
        /// Chain files, outermost first
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Declaration path of the section ("group/section")
        #[arg(long)]
        section: String,
        /// Resolve against a location sub-path first
        #[arg(long)]
        location: Option<String>,
        /// Output format: xml or json
        #[arg(long, default_value = "xml")]
        format: String,
    },
    /// Load the whole chain and report configuration errors
    Validate {
        /// Chain files, outermost first
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Map chain files (outermost first) onto levels and open the chain.
pub fn open_chain(files: &[PathBuf]) -> anyhow::Result<Configuration> {
    let levels: &[ConfigLevel] = match files.len() {
        0 => bail!("at least one configuration file is required"),
        1 => &[ConfigLevel::Application],
        2 => &[ConfigLevel::Machine, ConfigLevel::Application],
        3 => &[
            ConfigLevel::Machine,
            ConfigLevel::Application,
            ConfigLevel::RoamingUser,
        ],
        4 => &[
            ConfigLevel::Machine,
            ConfigLevel::Application,
            ConfigLevel::RoamingUser,
            ConfigLevel::LocalUser,
        ],
        n => bail!("a chain has at most 4 files, got {n}"),
    };
    let streams: Vec<LevelStream> = files
        .iter()
        .zip(levels)
        .map(|(file, level)| LevelStream::new(*level, file.to_string_lossy().into_owned()))
        .collect();

    let mut registry = TypeRegistry::new();
    register_builtins(&mut registry).context("registering built-in section types")?;
    Configuration::open(Rc::new(FileHost), Arc::new(registry), &streams)
        .map_err(|e| anyhow!("{e}"))
}

pub fn run(cli: &Cli) -> anyhow::Result<String> {
    match &cli.command {
        Commands::Sections { files } => sections_command(files),
        Commands::Get {
            files,
            section,
            location,
            format,
        } => get_command(files, section, location.as_deref(), format),
        Commands::Validate { files } => validate_command(files),
    }
}

fn collect_sections(group: &GroupDecl, prefix: &str, rows: &mut Vec<(String, SectionDecl)>) {
    for child in group.children() {
        let path = if prefix.is_empty() {
            child.name().to_string()
        } else {
            format!("{prefix}/{}", child.name())
        };
        match child {
            DeclNode::Section(decl) => rows.push((path, decl.clone())),
            DeclNode::Group(sub) => collect_sections(sub, &path, rows),
        }
    }
}

fn sections_command(files: &[PathBuf]) -> anyhow::Result<String> {
    let cfg = open_chain(files)?;
    let mut rows = Vec::new();
    collect_sections(&cfg.declarations(), "", &mut rows);

    let mut table = Table::new();
    table.set_header(["Section", "Type", "Declared in", "Placement"]);
    for (path, decl) in &rows {
        let placement = format!(
            "{:?}{}",
            decl.allow_exe_definition,
            if decl.allow_location { "" } else { ", no locations" }
        );
        table.add_row([
            path.as_str(),
            decl.type_name.as_str(),
            decl.stream_name.as_str(),
            placement.as_str(),
        ]);
    }

    let mut out = table.to_string();
    let locations = cfg.locations();
    if !locations.is_empty() {
        out.push_str("\n\nLocations:\n");
        for loc in locations {
            out.push_str(&format!(
                "  {} (allowOverride={})\n",
                loc.path, loc.allow_override
            ));
        }
    }
    Ok(out)
}

fn get_command(
    files: &[PathBuf],
    section_path: &str,
    location: Option<&str>,
    format: &str,
) -> anyhow::Result<String> {
    let mut cfg = open_chain(files)?;
    if let Some(subpath) = location {
        cfg = cfg
            .find_location_configuration(subpath)
            .map_err(|e| anyhow!("{e}"))?;
    }
    let handle = cfg
        .section(section_path)
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("section '{section_path}' is not declared in this chain"))?;
    let section = handle.borrow();

    if !section.is_typed() {
        return Ok(section
            .raw_xml()
            .map(str::to_string)
            .unwrap_or_else(|| format!("(section '{section_path}' has no content)")));
    }

    match format {
        "json" => {
            let json = section.element().map_err(|e| anyhow!("{e}"))?.to_json();
            Ok(serde_json::to_string_pretty(&json)?)
        }
        "xml" => {
            let registry = cfg.registry();
            let ty = registry
                .lookup(section.type_name())
                .ok_or_else(|| anyhow!("type '{}' is not registered", section.type_name()))?
                .clone();
            let mut effective = registry.instantiate(&ty).map_err(|e| anyhow!("{e}"))?;
            effective
                .unmerge(
                    section.element().map_err(|e| anyhow!("{e}"))?,
                    None,
                    SaveMode::Full,
                )
                .map_err(|e| anyhow!("{e}"))?;
            let mut w = XmlWriter::new();
            effective
                .serialize_to_element(&mut w, section.name())
                .map_err(|e| anyhow!("{e}"))?;
            Ok(w.into_string().map_err(|e| anyhow!("{e}"))?)
        }
        other => bail!("unknown output format '{other}' (expected xml or json)"),
    }
}

fn validate_command(files: &[PathBuf]) -> anyhow::Result<String> {
    let cfg = match open_chain(files) {
        Ok(cfg) => cfg,
        Err(e) => {
            return Ok(format!("{} {e}", "error:".red().bold()));
        }
    };

    let mut rows = Vec::new();
    collect_sections(&cfg.declarations(), "", &mut rows);

    let mut out = String::new();
    let mut errors = 0usize;
    for (path, _) in &rows {
        match cfg.section(path) {
            Ok(_) => {}
            Err(e) => {
                errors += 1;
                out.push_str(&format!("{} {path}: {e}\n", "error:".red().bold()));
            }
        }
    }
    if errors == 0 {
        out.push_str(&format!(
            "{} {} section(s) checked\n",
            "ok:".green().bold(),
            rows.len()
        ));
    } else {
        out.push_str(&format!("{errors} error(s)\n"));
    }
    Ok(out)
}
