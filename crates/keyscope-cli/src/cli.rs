use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keyscope",
    about = "Inspect and edit keyscope stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root directory (overrides the configuration)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Store id; the store file is `<root>/<id>.kvlog`
    #[arg(long, global = true, default_value = "default")]
    pub id: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the raw value stored at a key
    Get(GetArgs),
    /// Store a value at a key
    Set(SetArgs),
    /// Remove keys
    Rm(RmArgs),
    /// List every stored key
    Keys,
    /// Print the nested structure under a base key
    Tree(TreeArgs),
    /// Remove every key in the store
    Clear,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    pub value: String,
    #[arg(long, default_value = "string")]
    pub kind: ValueKindArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueKindArg {
    I32,
    I64,
    F32,
    F64,
    Bool,
    String,
    /// Hex-encoded byte blob
    BytesHex,
    /// Comma-separated string set
    StringSet,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Args)]
pub struct TreeArgs {
    pub base: String,
}
