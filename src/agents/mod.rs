pub mod handlers;

use serde_json::{Map, Value};

use crate::{
    errors::AppError,
    xapi::{Ifi, agent::IFI_KEYS},
};

/// Combined view of everything known about an agent: a Person object whose
/// properties are arrays.
pub fn person(agent: &Value) -> Result<Value, AppError> {
    Ifi::require(agent)?;

    let mut person = Map::new();
    person.insert("objectType".to_string(), Value::from("Person"));
    for key in std::iter::once("name").chain(IFI_KEYS) {
        if let Some(value) = agent.get(key) {
            person.insert(key.to_string(), Value::Array(vec![value.clone()]));
        }
    }
    Ok(Value::Object(person))
}
