//! A statement held as an open JSON tree with typed accessors for the fields
//! the store reasons about. Unknown properties are carried through untouched.

use serde_json::{Map, Value, json};

use crate::{
    errors::AppError,
    xapi::{VOIDING_VERB, agent::IFI_KEYS, extensions, ids},
};

/// Fields that may legitimately differ between two submissions of one statement.
pub const EXEMPT_FIELDS: [&str; 4] = ["authority", "stored", "timestamp", "version"];

const CONTEXT_ACTIVITY_KINDS: [&str; 4] = ["parent", "category", "grouping", "other"];

const INTERACTION_TYPES: [&str; 10] = [
    "true-false",
    "choice",
    "fill-in",
    "long-fill-in",
    "matching",
    "performance",
    "sequencing",
    "likert",
    "numeric",
    "other",
];

const INTERACTION_COMPONENTS: [&str; 5] = ["choices", "scale", "source", "target", "steps"];

#[derive(Debug, Clone, PartialEq)]
pub struct StatementDocument {
    body: Map<String, Value>,
}

impl StatementDocument {
    pub fn new(value: Value) -> Result<Self, AppError> {
        match value {
            Value::Object(body) => Ok(Self { body }),
            _ => Err(AppError::BadRequest(
                "Statement must be a JSON object".to_string(),
            )),
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('/').filter(|part| !part.is_empty());
        let mut current = self.body.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn text(&self, pointer: &str) -> Option<&str> {
        self.field(pointer).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.text("/id")
    }

    pub fn set_id(&mut self, id: String) {
        self.body.insert("id".to_string(), Value::String(id));
    }

    pub fn verb_id(&self) -> Option<&str> {
        self.text("/verb/id")
    }

    pub fn object(&self) -> Option<&Value> {
        self.body.get("object")
    }

    /// `objectType` of the main object; absent means Activity.
    pub fn object_type(&self) -> &str {
        self.text("/object/objectType").unwrap_or("Activity")
    }

    pub fn authority(&self) -> Option<&Value> {
        self.body.get("authority")
    }

    pub fn set_authority(&mut self, authority: Value) {
        self.body.insert("authority".to_string(), authority);
    }

    pub fn set_stored(&mut self, stored: &str) {
        self.body
            .insert("stored".to_string(), Value::String(stored.to_string()));
    }

    pub fn set_version(&mut self, version: &str) {
        self.body
            .insert("version".to_string(), Value::String(version.to_string()));
    }

    /// `timestamp` defaults to `stored`.
    pub fn default_timestamp(&mut self) {
        let missing = self.body.get("timestamp").is_none_or(Value::is_null);
        if missing {
            if let Some(stored) = self.body.get("stored").cloned() {
                self.body.insert("timestamp".to_string(), stored);
            }
        }
    }

    pub fn is_referencing(&self) -> bool {
        self.text("/object/objectType") == Some("StatementRef")
    }

    /// Voiding verb present, whatever the scheme of its IRI.
    pub fn has_voided(&self) -> bool {
        self.verb_id().is_some_and(|verb| {
            let without_scheme = verb
                .strip_prefix("https://")
                .or_else(|| verb.strip_prefix("http://"));
            without_scheme.is_some_and(|rest| rest.eq_ignore_ascii_case(VOIDING_VERB))
        })
    }

    pub fn is_voiding(&self) -> bool {
        self.is_referencing() && self.has_voided()
    }

    pub fn referenced_id(&self) -> Option<&str> {
        if self.is_referencing() {
            self.text("/object/id")
        } else {
            None
        }
    }

    /// Lowercases the statement id, the registration and a StatementRef target.
    pub fn normalize_ids(&mut self) -> Result<(), AppError> {
        if let Some(id) = self.id() {
            let normalized = ids::normalize_uuid(id)?;
            self.set_id(normalized);
        }

        if let Some(Value::String(registration)) = self
            .body
            .get_mut("context")
            .and_then(|context| context.get_mut("registration"))
        {
            *registration = ids::normalize_uuid(registration)?;
        }

        if self.is_referencing() {
            if let Some(Value::String(target)) = self
                .body
                .get_mut("object")
                .and_then(|object| object.get_mut("id"))
            {
                *target = ids::normalize_uuid(target)?;
            }
        }
        Ok(())
    }

    pub fn default_id(&mut self) {
        if self.id().is_none_or(str::is_empty) {
            self.set_id(ids::generate());
        }
    }

    /// Single-object `contextActivities` entries become one-element arrays.
    pub fn wrap_legacy_context_activities(&mut self) {
        let Some(Value::Object(activities)) = self
            .body
            .get_mut("context")
            .and_then(|context| context.get_mut("contextActivities"))
        else {
            return;
        };
        for kind in CONTEXT_ACTIVITY_KINDS {
            if let Some(entry) = activities.get_mut(kind) {
                if entry.is_object() {
                    *entry = Value::Array(vec![entry.take()]);
                }
            }
        }
    }

    /// Attachments without `fileUrl` point at the attachment endpoint.
    pub fn fill_attachment_urls(&mut self, attachment_url: &str) {
        let Some(Value::Array(attachments)) = self.body.get_mut("attachments") else {
            return;
        };
        for attachment in attachments.iter_mut() {
            let Some(entry) = attachment.as_object_mut() else {
                continue;
            };
            if entry.contains_key("fileUrl") {
                continue;
            }
            if let Some(sha2) = entry.get("sha2").and_then(Value::as_str) {
                let url = format!("{attachment_url}?sha2={sha2}");
                entry.insert("fileUrl".to_string(), Value::String(url));
            }
        }
    }

    pub fn escape_extensions(&mut self) {
        let mut value = Value::Object(std::mem::take(&mut self.body));
        extensions::escape_statement(&mut value);
        if let Value::Object(body) = value {
            self.body = body;
        }
    }

    /// Interaction definitions must be internally consistent.
    pub fn validate_definition(&self) -> Result<(), AppError> {
        if self.object_type() != "Activity" {
            return Ok(());
        }
        let Some(definition) = self.field("/object/definition").and_then(Value::as_object)
        else {
            return Ok(());
        };

        let interaction_type = definition.get("interactionType");
        let has_pattern = definition.contains_key("correctResponsesPattern");

        if has_pattern && interaction_type.is_none() {
            return Err(AppError::BadRequest(
                "correctResponsesPattern requires an interactionType".to_string(),
            ));
        }
        let Some(interaction_type) = interaction_type else {
            return Ok(());
        };

        let known = interaction_type
            .as_str()
            .is_some_and(|kind| INTERACTION_TYPES.contains(&kind));
        if !known {
            return Err(AppError::BadRequest(format!(
                "Invalid interactionType: {interaction_type}"
            )));
        }

        let has_component = INTERACTION_COMPONENTS
            .iter()
            .any(|component| definition.contains_key(*component));
        if !has_pattern && !has_component {
            return Err(AppError::BadRequest(format!(
                "Interaction activities need correctResponsesPattern or one of {}",
                INTERACTION_COMPONENTS.join(", ")
            )));
        }
        Ok(())
    }

    /// Activity objects eligible for the activities collection.
    pub fn activities(&self) -> Vec<Value> {
        match self.object() {
            Some(object) if self.object_type() == "Activity" && object.get("id").is_some() => {
                vec![object.clone()]
            }
            _ => Vec::new(),
        }
    }

    /// Body used to decide whether two submissions are the same statement.
    pub fn comparable(&self) -> Value {
        let mut body = self.body.clone();
        for field in EXEMPT_FIELDS {
            body.remove(field);
        }
        Value::Object(body)
    }
}

/// Renders a stored statement body for clients.
pub fn render(statement: &Value, format: Format) -> Value {
    let mut statement = statement.clone();
    extensions::unescape_statement(&mut statement);
    if format == Format::Ids {
        if let Some(body) = statement.as_object_mut() {
            reduce_to_ids(body);
        }
    }
    statement
}

/// Agent or Group cut down to its identifier. Anonymous groups keep their
/// members, each cut down in turn.
fn agent_ids(agent: &Value) -> Value {
    let Some(agent) = agent.as_object() else {
        return agent.clone();
    };
    let mut reduced = Map::new();
    if let Some(kind) = agent.get("objectType") {
        reduced.insert("objectType".to_string(), kind.clone());
    }
    let mut identified = false;
    for key in IFI_KEYS {
        if let Some(ifi) = agent.get(key) {
            reduced.insert(key.to_string(), ifi.clone());
            identified = true;
        }
    }
    if !identified {
        if let Some(Value::Array(members)) = agent.get("member") {
            let members = members.iter().map(agent_ids).collect();
            reduced.insert("member".to_string(), Value::Array(members));
        }
    }
    Value::Object(reduced)
}

fn activity_ids(activity: &Value) -> Value {
    match activity.get("id") {
        Some(id) => json!({ "objectType": "Activity", "id": id }),
        None => activity.clone(),
    }
}

/// The `ids` format: the statement keeps its shape while agents, groups,
/// activities and verbs keep only their identifying properties.
fn reduce_to_ids(statement: &mut Map<String, Value>) {
    for key in ["actor", "authority"] {
        if let Some(agent) = statement.get_mut(key) {
            *agent = agent_ids(agent);
        }
    }
    if let Some(verb) = statement.get_mut("verb") {
        if let Some(id) = verb.get("id").cloned() {
            *verb = json!({ "id": id });
        }
    }
    if let Some(object) = statement.get_mut("object") {
        let kind = object
            .get("objectType")
            .and_then(Value::as_str)
            .unwrap_or("Activity")
            .to_string();
        match kind.as_str() {
            "Activity" => *object = activity_ids(object),
            "Agent" | "Group" => *object = agent_ids(object),
            "SubStatement" => {
                if let Some(sub_statement) = object.as_object_mut() {
                    reduce_to_ids(sub_statement);
                }
            }
            _ => {}
        }
    }
    if let Some(context) = statement.get_mut("context").and_then(Value::as_object_mut) {
        for key in ["instructor", "team"] {
            if let Some(agent) = context.get_mut(key) {
                *agent = agent_ids(agent);
            }
        }
        if let Some(kinds) = context
            .get_mut("contextActivities")
            .and_then(Value::as_object_mut)
        {
            for activities in kinds.values_mut() {
                if let Value::Array(activities) = activities {
                    for activity in activities.iter_mut() {
                        *activity = activity_ids(activity);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Exact,
    Ids,
    Canonical,
}

impl Format {
    pub fn parse(raw: &str) -> Result<Format, AppError> {
        match raw {
            "exact" => Ok(Format::Exact),
            "ids" => Ok(Format::Ids),
            "canonical" => Ok(Format::Canonical),
            other => Err(AppError::BadRequest(format!("Invalid format: {other}"))),
        }
    }
}
