use serde_json::{json, Value};

use super::response::Reply;
use super::router::{ActionCtx, Domain};
use crate::assets::{parse_date, AssetOrder, AssetQuery};
use crate::error::{BridgeError, BridgeResult};
use crate::scene::apply_component_properties;
use crate::scene::info::node_info;

const DEFAULT_PAGE_SIZE: u64 = 50;

pub(super) fn domain() -> Domain {
    Domain::new("asset", &["manage_asset"])
        .action("search", search)
        .action("get_info", get_info)
        .action("modify", modify)
}

async fn search(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let modified_after = match params.str("filterDateAfter").filter(|d| !d.is_empty()) {
        Some(raw) => Some(parse_date(&raw).ok_or_else(|| {
            BridgeError::malformed(format!("Invalid filterDateAfter '{raw}'."))
        })?),
        None => None,
    };
    let order_by = match params.str("orderBy").as_deref().map(str::to_ascii_lowercase) {
        None => AssetOrder::Name,
        Some(order) if order == "name" => AssetOrder::Name,
        Some(order) if order == "date" => AssetOrder::Date,
        Some(order) => return Err(BridgeError::unknown("orderBy", order)),
    };
    let query = AssetQuery {
        pattern: params.str("searchPattern"),
        category: params.str("filterType").filter(|t| !t.is_empty()),
        path_prefix: params.str("path").filter(|p| !p.is_empty()),
        modified_after,
        order_by,
    };

    let (skip, limit) = match (params.u64("skip")?, params.u64("limit")?) {
        (None, None) => {
            let size = params.u64("pageSize")?.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
            let page = params.u64("pageNumber")?.unwrap_or(1).max(1);
            ((page - 1).saturating_mul(size), size)
        }
        (skip, limit) => (skip.unwrap_or(0), limit.unwrap_or(u64::MAX)),
    };

    let records = ctx
        .dispatcher
        .stage(move |stage| Ok(stage.assets.search(&query)))
        .await?;
    let total = records.len();
    let page: Vec<_> = records
        .into_iter()
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect();
    Ok(Reply::new(format!("Found {total} asset(s).")).with_data(json!({
        "totalAssets": total,
        "returned": page.len(),
        "assets": page,
    })))
}

async fn get_info(ctx: ActionCtx) -> BridgeResult<Reply> {
    let path = ctx.params.payload()?.require_str("path")?;
    let info = ctx
        .dispatcher
        .stage(move |stage| {
            let record = stage
                .assets
                .record(&path)
                .ok_or_else(|| BridgeError::not_found(format!("Asset '{path}' not found.")))?;
            let component_types: Vec<String> = stage
                .assets
                .load(&path)
                .map(|t| t.components.into_iter().map(|c| c.type_name).collect())
                .unwrap_or_default();
            Ok(json!({
                "name": record.name,
                "path": record.path,
                "category": record.category,
                "componentTypes": component_types,
            }))
        })
        .await?;
    Ok(Reply::new("Asset info retrieved.").with_data(info))
}

/// The catalog is read-only, so edits land on a fresh instance.
async fn modify(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let path = params.require_str("path")?;
    let properties = params
        .object("properties")?
        .cloned()
        .ok_or_else(|| BridgeError::missing("properties"))?;
    let (node, warnings) = ctx
        .dispatcher
        .stage(move |stage| {
            let template = stage
                .assets
                .load(&path)
                .ok_or_else(|| BridgeError::not_found(format!("Prefab '{path}' not found.")))?;
            let scene = stage.scenes.active_name();
            let (id, mut warnings) =
                stage.graph.instantiate(&template, &stage.registry, None, scene)?;
            for (component, props) in &properties {
                let Value::Object(props) = props else {
                    warnings.push(format!("properties for '{component}' must be an object"));
                    continue;
                };
                let Some(type_name) = stage.registry.resolve(component).map(|k| k.name) else {
                    warnings.push(format!("component type '{component}' not found"));
                    continue;
                };
                match apply_component_properties(stage.graph.as_mut(), id, type_name, props) {
                    Ok(failed) => warnings.extend(failed),
                    Err(err) => warnings.push(err.to_string()),
                }
            }
            let node = node_info(stage.graph.as_ref(), id)
                .ok_or_else(|| BridgeError::collaborator("Instance vanished after spawn."))?;
            Ok((node, warnings))
        })
        .await?;
    Ok(Reply::new(format!("Instance '{}' modified.", node.name))
        .with_warnings(&warnings)
        .with_data(node))
}
