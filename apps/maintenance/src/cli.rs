use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "quill-maintenance",
    about = "Out-of-band maintenance for the Quill document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database URL. Falls back to `DATABASE_URL`.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report slugs held by more than one document
    Duplicates(DuplicatesArgs),
    /// Show which document a slug resolves to
    Resolve(ResolveArgs),
    /// Report stored users no longer on the AUTHORIZED_USERS list
    Users(UsersArgs),
    /// Report documents stored under a partition key other than their id
    Addresses,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    Posts,
    Pages,
    All,
}

impl Scope {
    pub fn includes_posts(self) -> bool {
        matches!(self, Self::Posts | Self::All)
    }

    pub fn includes_pages(self) -> bool {
        matches!(self, Self::Pages | Self::All)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Post,
    Page,
}

#[derive(Args, Debug)]
pub struct DuplicatesArgs {
    #[arg(long, value_enum, default_value = "all")]
    pub kind: Scope,

    /// Delete the shadowed records, keeping the one reads resolve to
    #[arg(long)]
    pub remove: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub slug: String,

    #[arg(long, value_enum, default_value = "post")]
    pub kind: Kind,
}

#[derive(Args, Debug)]
pub struct UsersArgs {
    /// Delete the users that are not on the allow list
    #[arg(long)]
    pub prune: bool,
}
