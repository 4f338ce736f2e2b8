use serde_json::{json, Map, Value};

use super::params::Params;
use super::response::Reply;
use super::router::{ActionCtx, Domain};
use crate::error::{BridgeError, BridgeResult};
use crate::scene::info::{node_info, NodeInfo};
use crate::scene::ops::{self, ComponentRequest, CreateRequest, LayerRef, ModifyRequest};
use crate::scene::search::{self, NodeQuery, SearchMethod};
use crate::scene::NodeId;
use crate::stage::Stage;

pub(super) fn domain() -> Domain {
    Domain::new("scene_node", &["manage_gameobject"])
        .action("find", find)
        .action("create", create)
        .action("modify", modify)
        .action("delete", delete)
        .action("get_components", get_components)
        .action("add_component", add_component)
        .action("remove_component", remove_component)
        .action("set_component_property", set_component_property)
}

/// `target` plus the search flags shared by every targeted action.
pub(super) fn node_query(params: &Params) -> BridgeResult<NodeQuery> {
    let target = params.require_str("target")?;
    let method = match params.str("searchMethod").filter(|m| !m.is_empty()) {
        Some(method) => method.parse()?,
        None => SearchMethod::ByName,
    };
    Ok(NodeQuery {
        target,
        method,
        find_all: params.bool_or("findAll", false)?,
        include_inactive: params.bool_or("searchInactive", true)?,
        include_children: params.bool_or("searchInChildren", true)?,
    })
}

/// A bare reference: instance ids as numbers, `a/b` as a path, anything
/// else as a name.
fn loose_query(value: &Value) -> BridgeResult<NodeQuery> {
    match value {
        Value::Number(n) => Ok(NodeQuery {
            method: SearchMethod::ById,
            ..NodeQuery::by_name(n.to_string())
        }),
        Value::String(s) if s.contains('/') => Ok(NodeQuery {
            method: SearchMethod::ByPath,
            ..NodeQuery::by_name(s.trim())
        }),
        Value::String(s) => Ok(NodeQuery::by_name(s.trim())),
        Value::Object(map) => node_query(&Params::new(map.clone())),
        _ => Err(BridgeError::malformed(
            "'parent' must be a name, a path, an id or {target, searchMethod}.",
        )),
    }
}

fn layer_ref(params: &Params) -> BridgeResult<Option<LayerRef>> {
    match params.get("layer") {
        None => Ok(None),
        Some(value) => match params.u64("layer") {
            Ok(Some(index)) => u32::try_from(index)
                .map(|i| Some(LayerRef::Index(i)))
                .map_err(|_| BridgeError::malformed("'layer' is out of range.")),
            _ => match value {
                Value::String(name) => Ok(Some(LayerRef::Name(name.trim().to_string()))),
                _ => Err(BridgeError::malformed("'layer' must be an index or a name.")),
            },
        },
    }
}

fn component_request(value: &Value) -> BridgeResult<ComponentRequest> {
    match value {
        Value::String(name) => Ok(ComponentRequest {
            type_name: name.trim().to_string(),
            properties: Map::new(),
        }),
        Value::Object(map) => {
            let params = Params::new(map.clone());
            Ok(ComponentRequest {
                type_name: params.require_str("typeName")?,
                properties: params.object("properties")?.cloned().unwrap_or_default(),
            })
        }
        _ => Err(BridgeError::malformed(
            "Components must be type names or {typeName, properties}.",
        )),
    }
}

fn entry_ci<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn info(stage: &Stage, id: NodeId) -> BridgeResult<NodeInfo> {
    node_info(stage.graph.as_ref(), id)
        .ok_or_else(|| BridgeError::not_found(format!("Node {id} not found.")))
}

async fn find(ctx: ActionCtx) -> BridgeResult<Reply> {
    let query = node_query(&ctx.params.payload()?)?;
    let found = ctx
        .dispatcher
        .stage(move |stage| {
            let ids = search::find(stage.graph.as_ref(), &stage.registry, &query)?;
            Ok(ids
                .into_iter()
                .filter_map(|id| node_info(stage.graph.as_ref(), id))
                .collect::<Vec<_>>())
        })
        .await?;
    Ok(Reply::new(format!("Found {} GameObject(s).", found.len())).with_data(found))
}

async fn create(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let mut skipped = Vec::new();
    let components = match params.get("componentsToAdd") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match component_request(item) {
                Ok(request) => Some(request),
                Err(err) => {
                    skipped.push(format!("component entry {item} skipped: {err}"));
                    None
                }
            })
            .collect(),
        Some(_) => return Err(BridgeError::malformed("'componentsToAdd' must be a list.")),
    };
    let request = CreateRequest {
        name: params.str("name").filter(|n| !n.is_empty()),
        primitive: params.str("primitiveType").filter(|p| !p.is_empty()),
        prefab_path: params.str("prefabPath").filter(|p| !p.is_empty()),
        position: params.vec3("position")?,
        rotation: params.vec3("rotation")?,
        scale: params.vec3("scale")?,
        parent: params.get("parent").map(loose_query).transpose()?,
        tag: params.str("tag"),
        layer: layer_ref(&params)?,
        active: params.bool("setActive")?,
        components,
        color: params.color("color")?,
    };
    let (created, warnings) = ctx
        .dispatcher
        .stage(move |stage| {
            let applied = ops::create(stage, &request)?;
            Ok((info(stage, applied.value)?, applied.warnings))
        })
        .await?;
    skipped.extend(warnings);
    let warnings = skipped;
    Ok(Reply::new(format!("GameObject '{}' created.", created.name))
        .with_warnings(&warnings)
        .with_data(created))
}

async fn modify(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let query = node_query(&params)?;
    let parent = match params.raw().get("parent") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(value) => Some(Some(loose_query(value)?)),
    };
    let request = ModifyRequest {
        name: params.str("name").filter(|n| !n.is_empty()),
        position: params.vec3("position")?,
        rotation: params.vec3("rotation")?,
        scale: params.vec3("scale")?,
        tag: params.str("tag"),
        layer: layer_ref(&params)?,
        active: params.bool("setActive")?,
        parent,
        component_properties: params
            .object("componentProperties")?
            .cloned()
            .unwrap_or_default(),
    };
    let (node, applied) = ctx
        .dispatcher
        .stage(move |stage| {
            let id = ops::find_one(stage, &query)?;
            let applied = ops::modify(stage, id, &request)?;
            Ok((info(stage, id)?, applied))
        })
        .await?;
    let message = if applied.value || !applied.warnings.is_empty() {
        format!("GameObject '{}' modified.", node.name)
    } else {
        format!("No changes applied to GameObject '{}'.", node.name)
    };
    Ok(Reply::new(message)
        .with_warnings(&applied.warnings)
        .with_data(node))
}

async fn delete(ctx: ActionCtx) -> BridgeResult<Reply> {
    let query = node_query(&ctx.params.payload()?)?;
    let deleted = ctx
        .dispatcher
        .stage(move |stage| {
            let ids = ops::find_required(stage, &query)?;
            ops::delete(stage, &ids)
        })
        .await?;
    let listed: Vec<Value> = deleted
        .iter()
        .map(|(name, id)| json!({ "name": name, "instanceID": id }))
        .collect();
    Ok(Reply::new(format!("Deleted {} GameObject(s).", listed.len())).with_data(listed))
}

async fn get_components(ctx: ActionCtx) -> BridgeResult<Reply> {
    let query = node_query(&ctx.params.payload()?)?;
    let (name, components) = ctx
        .dispatcher
        .stage(move |stage| {
            let id = ops::find_one(stage, &query)?;
            Ok((info(stage, id)?.name, ops::components(stage, id)?))
        })
        .await?;
    Ok(
        Reply::new(format!("Retrieved {} component(s) from '{name}'.", components.len()))
            .with_data(components),
    )
}

async fn add_component(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let query = node_query(&params)?;
    let request = match params.str("componentName").filter(|n| !n.is_empty()) {
        Some(type_name) => ComponentRequest {
            properties: params
                .object("componentProperties")?
                .and_then(|props| entry_ci(props, &type_name))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            type_name,
        },
        None => match params.get("componentsToAdd") {
            Some(Value::Array(items)) if !items.is_empty() => component_request(&items[0])?,
            _ => return Err(BridgeError::missing("componentName")),
        },
    };
    let (node, applied) = ctx
        .dispatcher
        .stage(move |stage| {
            let id = ops::find_one(stage, &query)?;
            let applied = ops::add_component(stage, id, &request)?;
            Ok((info(stage, id)?, applied))
        })
        .await?;
    Ok(
        Reply::new(format!("Component '{}' added to '{}'.", applied.value, node.name))
            .with_warnings(&applied.warnings)
            .with_data(node),
    )
}

async fn remove_component(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let query = node_query(&params)?;
    let type_name = match params.str("componentName").filter(|n| !n.is_empty()) {
        Some(name) => name,
        None => match params.get("componentsToRemove") {
            Some(Value::Array(items)) => items
                .first()
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| BridgeError::missing("componentName"))?,
            _ => return Err(BridgeError::missing("componentName")),
        },
    };
    let (node, removed) = ctx
        .dispatcher
        .stage(move |stage| {
            let id = ops::find_one(stage, &query)?;
            let removed = ops::remove_component(stage, id, &type_name)?;
            Ok((info(stage, id)?, removed))
        })
        .await?;
    Ok(Reply::new(format!("Component '{removed}' removed from '{}'.", node.name)).with_data(node))
}

async fn set_component_property(ctx: ActionCtx) -> BridgeResult<Reply> {
    let params = ctx.params.payload()?;
    let query = node_query(&params)?;
    let type_name = params.require_str("componentName")?;
    let all = params
        .object("componentProperties")?
        .ok_or_else(|| BridgeError::missing("componentProperties"))?;
    let props = match entry_ci(all, &type_name) {
        Some(Value::Object(nested)) => nested.clone(),
        _ => all.clone(),
    };
    if props.is_empty() {
        return Err(BridgeError::malformed("'componentProperties' is empty."));
    }
    let (node, applied) = ctx
        .dispatcher
        .stage(move |stage| {
            let id = ops::find_one(stage, &query)?;
            let applied = ops::set_properties(stage, id, &type_name, &props)?;
            Ok((info(stage, id)?, applied))
        })
        .await?;
    Ok(
        Reply::new(format!("Properties set on '{}' of '{}'.", applied.value, node.name))
            .with_warnings(&applied.warnings)
            .with_data(node),
    )
}
