use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Args,
    dingbot_config::DingbotConfig,
    dingbot_robot::{Attachment, DispatchItem, MessageInput, Orchestrator},
    serde::Deserialize,
    serde_json::Value,
    tracing::info,
};

#[derive(Args)]
pub struct SendArgs {
    /// JSON file holding an array of items to dispatch, in order.
    #[arg(long, short)]
    items: PathBuf,
    /// Write the output batch here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Record failed items and keep going (overrides `dispatch.continue_on_fail`).
    #[arg(long)]
    continue_on_fail: bool,
}

/// One entry of an items file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemEntry {
    /// Host payload echoed back when the item fails.
    #[serde(default)]
    json: Value,
    message: MessageInput,
    #[serde(default)]
    mobiles: Vec<String>,
    /// File to upload for a `file` message, relative to the items file.
    #[serde(default)]
    attachment_path: Option<PathBuf>,
}

impl ItemEntry {
    async fn into_item(self, base_dir: &Path) -> Result<DispatchItem> {
        let mut item = DispatchItem::new(self.message)
            .with_json(match self.json {
                Value::Null => Value::Object(Default::default()),
                json => json,
            })
            .with_mobiles(self.mobiles);
        if let Some(path) = self.attachment_path {
            let path = base_dir.join(path);
            let attachment = Attachment::read(&path)
                .await
                .with_context(|| format!("reading attachment {}", path.display()))?;
            item = item.with_attachment(attachment);
        }
        Ok(item)
    }
}

async fn read_items(path: &Path) -> Result<Vec<DispatchItem>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<ItemEntry> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new("."));

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        items.push(entry.into_item(base_dir).await?);
    }
    Ok(items)
}

pub async fn handle_send(mut config: DingbotConfig, args: SendArgs) -> Result<()> {
    if args.continue_on_fail {
        config.dispatch.continue_on_fail = true;
    }
    let items = read_items(&args.items).await?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let report = orchestrator.run(&items).await?;

    let rendered = serde_json::to_string_pretty(&report.outputs)?;
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output batch written");
        },
        None => println!("{rendered}"),
    }
    eprintln!(
        "{} sent, {} failed, {} unresolved mobile(s)",
        report.sent, report.failed, report.unresolved
    );
    Ok(())
}
