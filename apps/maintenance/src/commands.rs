use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use quill_core::domain::{AllowList, Page, Post, User};
use quill_core::identity::{DuplicateSlug, ShadowCleanup, Slugged};
use quill_core::ports::{DocumentAddress, DocumentQuery, DocumentStore};
use quill_core::{IdentityResolver, StoreError};
use quill_infra::{DatabaseConfig, InMemoryDocumentStore, PostgresDocumentStore, containers};

use crate::cli::{Cli, Command, DuplicatesArgs, Kind, OutputFormat, ResolveArgs, UsersArgs};

/// Lists rows a container holds under a partition key other than their id.
#[async_trait]
pub trait AddressAudit: Send + Sync {
    fn container(&self) -> &'static str;

    async fn diverged_addresses(&self) -> Result<Vec<DocumentAddress>, StoreError>;
}

#[async_trait]
impl<T> AddressAudit for PostgresDocumentStore<T>
where
    T: Send + Sync,
{
    fn container(&self) -> &'static str {
        PostgresDocumentStore::container(self)
    }

    async fn diverged_addresses(&self) -> Result<Vec<DocumentAddress>, StoreError> {
        PostgresDocumentStore::diverged_addresses(self).await
    }
}

#[async_trait]
impl<T> AddressAudit for InMemoryDocumentStore<T>
where
    T: Send + Sync,
{
    fn container(&self) -> &'static str {
        InMemoryDocumentStore::container(self)
    }

    async fn diverged_addresses(&self) -> Result<Vec<DocumentAddress>, StoreError> {
        InMemoryDocumentStore::diverged_addresses(self).await
    }
}

/// What the maintenance commands operate on.
pub struct Targets {
    posts: IdentityResolver<Post>,
    pages: IdentityResolver<Page>,
    users: Arc<dyn DocumentStore<User>>,
    allow_list: AllowList,
    /// Containers partitioned by their own id. Comments are partitioned by
    /// post and never belong here.
    audits: Vec<Arc<dyn AddressAudit>>,
}

impl Targets {
    pub fn new(
        posts: Arc<dyn DocumentStore<Post>>,
        pages: Arc<dyn DocumentStore<Page>>,
        users: Arc<dyn DocumentStore<User>>,
        allow_list: AllowList,
    ) -> Self {
        Self {
            posts: IdentityResolver::new(posts),
            pages: IdentityResolver::new(pages),
            users,
            allow_list,
            audits: Vec::new(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AddressAudit>) -> Self {
        self.audits.push(audit);
        self
    }

    pub async fn connect(config: &DatabaseConfig, allow_list: AllowList) -> anyhow::Result<Self> {
        let db = quill_infra::connect(config)
            .await
            .context("failed to connect to the document database")?;
        let posts = Arc::new(PostgresDocumentStore::<Post>::new(db.clone(), containers::POSTS));
        let pages = Arc::new(PostgresDocumentStore::<Page>::new(db.clone(), containers::PAGES));
        let users = Arc::new(PostgresDocumentStore::<User>::new(db, containers::USERS));

        Ok(Self::new(posts.clone(), pages.clone(), users.clone(), allow_list)
            .with_audit(posts)
            .with_audit(pages)
            .with_audit(users))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateReport {
    kind: &'static str,
    slug: String,
    chosen_id: String,
    shadowed_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
    /// Shadowed ids that were not found at their address during removal.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<String>,
}

impl From<DuplicateSlug> for DuplicateReport {
    fn from(duplicate: DuplicateSlug) -> Self {
        Self {
            kind: duplicate.kind,
            slug: duplicate.slug,
            chosen_id: duplicate.chosen_id,
            shadowed_ids: duplicate.shadowed_ids,
            removed: None,
            missing: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlistedUser {
    id: String,
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserAudit {
    checked: usize,
    unlisted: Vec<UnlistedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DivergedAddress {
    container: &'static str,
    id: String,
    partition_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Resolution {
    kind: &'static str,
    id: String,
    slug: String,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Resolution {
    fn of<T: Slugged>(doc: &T) -> Self {
        Self {
            kind: T::KIND,
            id: doc.id().to_string(),
            slug: doc.slug().to_string(),
            published_at: doc.published_at(),
            created_at: doc.created_at(),
        }
    }
}

pub async fn run_command(cli: Cli, targets: &Targets, out: &mut impl Write) -> anyhow::Result<()> {
    match cli.command {
        Command::Duplicates(args) => cmd_duplicates(args, cli.format, targets, out).await,
        Command::Resolve(args) => cmd_resolve(args, cli.format, targets, out).await,
        Command::Users(args) => cmd_users(args, cli.format, targets, out).await,
        Command::Addresses => cmd_addresses(cli.format, targets, out).await,
    }
}

async fn duplicates_of<T: Slugged>(
    resolver: &IdentityResolver<T>,
    remove: bool,
) -> anyhow::Result<Vec<DuplicateReport>> {
    let found = resolver
        .find_duplicates()
        .await
        .with_context(|| format!("failed to scan {} slugs", T::KIND))?;

    let mut reports = Vec::with_capacity(found.len());
    for duplicate in found {
        let cleanup = if remove {
            Some(resolver.remove_shadowed(&duplicate).await?)
        } else {
            None
        };
        let mut report = DuplicateReport::from(duplicate);
        if let Some(ShadowCleanup { removed, missing }) = cleanup {
            report.removed = Some(removed);
            report.missing = missing;
        }
        reports.push(report);
    }
    Ok(reports)
}

async fn cmd_duplicates(
    args: DuplicatesArgs,
    format: OutputFormat,
    targets: &Targets,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut reports = Vec::new();
    if args.kind.includes_posts() {
        reports.extend(duplicates_of(&targets.posts, args.remove).await?);
    }
    if args.kind.includes_pages() {
        reports.extend(duplicates_of(&targets.pages, args.remove).await?);
    }
    tracing::info!(found = reports.len(), remove = args.remove, "Duplicate slug scan finished");

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?,
        OutputFormat::Text if reports.is_empty() => writeln!(out, "No duplicate slugs.")?,
        OutputFormat::Text => {
            for report in &reports {
                writeln!(
                    out,
                    "{} '{}': serving {}, shadowed {}",
                    report.kind,
                    report.slug,
                    report.chosen_id,
                    report.shadowed_ids.join(", ")
                )?;
                if let Some(removed) = report.removed {
                    writeln!(out, "  removed {removed}")?;
                }
                if !report.missing.is_empty() {
                    writeln!(out, "  not at their address: {}", report.missing.join(", "))?;
                }
            }
        }
    }
    Ok(())
}

async fn cmd_resolve(
    args: ResolveArgs,
    format: OutputFormat,
    targets: &Targets,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let found = match args.kind {
        Kind::Post => targets.posts.find_by_slug(&args.slug).await?.as_ref().map(Resolution::of),
        Kind::Page => targets.pages.find_by_slug(&args.slug).await?.as_ref().map(Resolution::of),
    };

    match (found, format) {
        (Some(resolution), OutputFormat::Json) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&resolution)?)?
        }
        (Some(resolution), OutputFormat::Text) => writeln!(
            out,
            "{} '{}' -> {}",
            resolution.kind, resolution.slug, resolution.id
        )?,
        (None, _) => anyhow::bail!("no document has slug '{}'", args.slug),
    }
    Ok(())
}

async fn cmd_users(
    args: UsersArgs,
    format: OutputFormat,
    targets: &Targets,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    if args.prune && targets.allow_list.is_empty() {
        anyhow::bail!("AUTHORIZED_USERS is empty, refusing to prune every user");
    }

    let users = targets
        .users
        .query(&DocumentQuery::new().order_asc("email"))
        .await
        .context("failed to list users")?;
    let checked = users.len();
    let unlisted: Vec<User> = users
        .into_iter()
        .filter(|user| !targets.allow_list.is_authorized(&user.email))
        .collect();

    let removed = if args.prune {
        let mut removed = 0;
        for user in &unlisted {
            match targets.users.delete(&user.address()).await {
                Ok(()) => removed += 1,
                Err(StoreError::NotFound) => {
                    tracing::warn!(user_id = %user.id, "User not found at its address, left in place")
                }
                Err(e) => return Err(e).with_context(|| format!("failed to delete user {}", user.id)),
            }
        }
        Some(removed)
    } else {
        None
    };
    tracing::info!(checked, unlisted = unlisted.len(), prune = args.prune, "User audit finished");

    let audit = UserAudit {
        checked,
        unlisted: unlisted
            .into_iter()
            .map(|user| UnlistedUser {
                id: user.id,
                email: user.email,
                name: user.name,
            })
            .collect(),
        removed,
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&audit)?)?,
        OutputFormat::Text => {
            writeln!(
                out,
                "{} users checked, {} not on the allow list",
                audit.checked,
                audit.unlisted.len()
            )?;
            for user in &audit.unlisted {
                writeln!(out, "  {} ({})", user.email, user.id)?;
            }
            if let Some(removed) = audit.removed {
                writeln!(out, "  removed {removed}")?;
            }
        }
    }
    Ok(())
}

async fn cmd_addresses(
    format: OutputFormat,
    targets: &Targets,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut diverged = Vec::new();
    for audit in &targets.audits {
        let container = audit.container();
        let addresses = audit
            .diverged_addresses()
            .await
            .with_context(|| format!("failed to audit {container}"))?;
        diverged.extend(addresses.into_iter().map(|address| DivergedAddress {
            container,
            id: address.id,
            partition_key: address.partition_key,
        }));
    }
    tracing::info!(found = diverged.len(), "Address audit finished");

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&diverged)?)?,
        OutputFormat::Text if diverged.is_empty() => writeln!(out, "No diverged addresses.")?,
        OutputFormat::Text => {
            for row in &diverged {
                writeln!(out, "{} {} under partition {}", row.container, row.id, row.partition_key)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use clap::Parser;
    use quill_core::address_for;
    use quill_core::domain::{Author, PostDraft, PublishStatus};

    fn author() -> Author {
        Author {
            id: "u1".into(),
            name: "Owner".into(),
            email: "owner@example.com".into(),
        }
    }

    fn post(slug: &str, published: bool, age_days: i64) -> Post {
        let now = Utc::now() - TimeDelta::days(age_days);
        Post::new(
            PostDraft {
                slug: slug.into(),
                title: slug.into(),
                status: if published {
                    PublishStatus::Published
                } else {
                    PublishStatus::Draft
                },
                ..PostDraft::default()
            },
            author(),
            now,
        )
    }

    fn targets(
        posts: Arc<InMemoryDocumentStore<Post>>,
        users: Arc<InMemoryDocumentStore<User>>,
        allow: &str,
    ) -> Targets {
        let pages = Arc::new(InMemoryDocumentStore::<Page>::new(containers::PAGES));
        let allow_list = AllowList::parse(allow).unwrap();
        Targets::new(posts.clone(), pages.clone(), users.clone(), allow_list)
            .with_audit(posts)
            .with_audit(pages)
            .with_audit(users)
    }

    async fn seeded(posts: &[Post]) -> (Targets, Arc<InMemoryDocumentStore<Post>>) {
        let store = Arc::new(InMemoryDocumentStore::<Post>::new(containers::POSTS));
        for p in posts {
            store.upsert(&address_for(p), p).await.unwrap();
        }
        let users = Arc::new(InMemoryDocumentStore::<User>::new(containers::USERS));
        (targets(store.clone(), users, ""), store)
    }

    async fn with_users(users: &[User], allow: &str) -> (Targets, Arc<InMemoryDocumentStore<User>>) {
        let store = Arc::new(InMemoryDocumentStore::<User>::new(containers::USERS));
        for user in users {
            store.upsert(&user.address(), user).await.unwrap();
        }
        let posts = Arc::new(InMemoryDocumentStore::<Post>::new(containers::POSTS));
        (targets(posts, store.clone(), allow), store)
    }

    fn user(email: &str) -> User {
        User::new(email, email.into(), vec!["author".into()], None)
    }

    async fn run(args: &[&str], targets: &Targets) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("quill-maintenance").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run_command(cli, targets, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn test_reports_clean_store() {
        let (targets, _) = seeded(&[post("hello", true, 1), post("other", true, 2)]).await;

        let output = run(&["duplicates"], &targets).await.unwrap();

        assert_eq!(output.trim(), "No duplicate slugs.");
    }

    #[tokio::test]
    async fn test_report_leaves_duplicates_in_place() {
        let newer = post("hello", true, 1);
        let older = post("hello", true, 30);
        let (targets, store) = seeded(&[older.clone(), newer.clone()]).await;

        let output = run(&["duplicates", "--kind", "posts"], &targets).await.unwrap();

        assert!(output.contains(&format!("serving {}", newer.id)));
        assert!(output.contains(&older.id));
        assert_eq!(store.query(&DocumentQuery::new()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_keeps_the_served_record() {
        let published = post("hello", true, 10);
        let draft = post("hello", false, 0);
        let (targets, store) = seeded(&[published.clone(), draft]).await;

        let output = run(&["--format", "json", "duplicates", "--remove"], &targets)
            .await
            .unwrap();

        let reports: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(reports[0]["chosenId"], published.id.as_str());
        assert_eq!(reports[0]["removed"], 1);
        let remaining = store.query(&DocumentQuery::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, published.id);
    }

    #[tokio::test]
    async fn test_resolve_prints_chosen_id() {
        let newer = post("hello", true, 1);
        let (targets, _) = seeded(&[post("hello", true, 5), newer.clone()]).await;

        let output = run(&["resolve", "hello"], &targets).await.unwrap();

        assert_eq!(output.trim(), format!("post 'hello' -> {}", newer.id));
    }

    #[tokio::test]
    async fn test_resolve_missing_slug_fails() {
        let (targets, _) = seeded(&[]).await;

        let err = run(&["resolve", "nope", "--kind", "page"], &targets)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_remove_reports_duplicates_outside_their_address() {
        let kept = post("hello", true, 1);
        let stray = post("hello", true, 30);
        let (targets, store) = seeded(&[kept.clone()]).await;
        store
            .upsert(&DocumentAddress::new(&stray.id, "hello"), &stray)
            .await
            .unwrap();

        let output = run(&["duplicates", "--remove"], &targets).await.unwrap();

        assert!(output.contains("removed 0"));
        assert!(output.contains(&format!("not at their address: {}", stray.id)));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_users_report_is_case_insensitive() {
        let owner = user("owner@example.com");
        let former = user("former@example.com");
        let (targets, store) = with_users(&[owner.clone(), former.clone()], "OWNER@Example.com:admin").await;

        let output = run(&["users"], &targets).await.unwrap();

        assert!(output.starts_with("2 users checked, 1 not on the allow list"));
        assert!(output.contains(&former.id));
        assert!(!output.contains(&owner.id));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_users_prune_deletes_unlisted() {
        let owner = user("owner@example.com");
        let former = user("former@example.com");
        let (targets, store) = with_users(&[owner.clone(), former.clone()], "owner@example.com").await;

        let output = run(&["--format", "json", "users", "--prune"], &targets)
            .await
            .unwrap();

        let audit: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(audit["checked"], 2);
        assert_eq!(audit["unlisted"][0]["email"], "former@example.com");
        assert_eq!(audit["removed"], 1);
        let remaining = store.query(&DocumentQuery::new()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, owner.id);
    }

    #[tokio::test]
    async fn test_prune_refuses_an_empty_allow_list() {
        let (targets, store) = with_users(&[user("owner@example.com")], "").await;

        let err = run(&["users", "--prune"], &targets).await.unwrap_err();

        assert!(err.to_string().contains("AUTHORIZED_USERS"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_addresses_lists_rows_outside_id_partition() {
        let good = post("hello", true, 1);
        let stray = post("other", true, 2);
        let (targets, store) = seeded(&[good]).await;
        store
            .upsert(&DocumentAddress::new(&stray.id, "other"), &stray)
            .await
            .unwrap();

        let output = run(&["--format", "json", "addresses"], &targets).await.unwrap();

        let rows: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["container"], "posts");
        assert_eq!(rows[0]["id"], stray.id.as_str());
        assert_eq!(rows[0]["partitionKey"], "other");
        // Report only.
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_addresses_on_clean_store() {
        let (targets, _) = seeded(&[post("hello", true, 1)]).await;

        let output = run(&["addresses"], &targets).await.unwrap();

        assert_eq!(output.trim(), "No diverged addresses.");
    }
}
