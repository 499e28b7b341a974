//! Cycle-safe deep merge of plain-object trees, used to fold manifest
//! overrides and configuration fragments into one object.

use crate::script::Value;

/// Merges `source` into `target` and returns `target`. See [`merge_into`].
pub fn merge(target: &Value, source: &Value) -> Value {
    merge_into(target, std::slice::from_ref(source))
}

/// Deep-merges each source into `target`, left to right, and returns
/// `target`. Only plain objects merge recursively; arrays, functions,
/// regexes, dates, and scalars are assigned by reference, so the target
/// shares them with the source. A non-object target is returned unchanged.
///
/// One visit list spans the whole call and maps each source sub-object to
/// the target it merged into; re-encountering a source sub-object (a cycle
/// or a shared reference) reuses that mapping instead of descending again,
/// so cyclic inputs terminate and shared inputs stay shared in the output.
pub fn merge_into(target: &Value, sources: &[Value]) -> Value {
    if !target.is_plain_object() {
        return target.clone();
    }
    let mut visited: Vec<(usize, Value)> = Vec::new();
    for source in sources {
        merge_one(target, source, &mut visited);
    }
    target.clone()
}

fn merge_one(target: &Value, source: &Value, visited: &mut Vec<(usize, Value)>) {
    if !source.is_plain_object() || !target.is_plain_object() {
        return;
    }
    if let Some(id) = source.ptr_id() {
        visited.push((id, target.clone()));
    }
    for key in source.keys() {
        let Some(value) = source.get(&key) else {
            continue;
        };
        if value.is_plain_object() {
            let value_id = value.ptr_id();
            if let Some((_, mapped)) = visited.iter().find(|(id, _)| Some(*id) == value_id) {
                target.set(&key, mapped.clone());
                continue;
            }
            let slot = match target.get(&key) {
                Some(existing) if existing.is_plain_object() => existing,
                _ => {
                    let fresh = Value::object();
                    target.set(&key, fresh.clone());
                    fresh
                }
            };
            merge_one(&slot, &value, visited);
        } else {
            target.set(&key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(entries: Vec<(&str, Value)>) -> Value {
        Value::object_from(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn merges_nested_objects() {
        let target = obj(vec![
            ("a", Value::Number(1.0)),
            ("nested", obj(vec![("x", Value::Number(1.0))])),
        ]);
        let source = obj(vec![
            ("b", Value::Number(2.0)),
            ("nested", obj(vec![("y", Value::Number(2.0))])),
        ]);
        let merged = merge(&target, &source);
        assert_eq!(merged.get("a"), Some(Value::Number(1.0)));
        assert_eq!(merged.get("b"), Some(Value::Number(2.0)));
        let nested = merged.get("nested").unwrap();
        assert_eq!(nested.get("x"), Some(Value::Number(1.0)));
        assert_eq!(nested.get("y"), Some(Value::Number(2.0)));
    }

    #[test]
    fn later_sources_win() {
        let target = Value::object();
        let first = obj(vec![("v", Value::Number(1.0))]);
        let second = obj(vec![("v", Value::Number(2.0))]);
        let merged = merge_into(&target, &[first, second]);
        assert_eq!(merged.get("v"), Some(Value::Number(2.0)));
    }

    #[test]
    fn non_plain_values_assign_by_reference() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let source = obj(vec![("list", shared.clone())]);
        let target = Value::object();
        merge(&target, &source);
        assert!(Value::same_ref(&target.get("list").unwrap(), &shared));
    }

    #[test]
    fn replaces_non_object_slot_with_fresh_object() {
        let target = obj(vec![("n", Value::Number(1.0))]);
        let source = obj(vec![("n", obj(vec![("k", Value::Number(2.0))]))]);
        merge(&target, &source);
        assert_eq!(target.get("n").unwrap().get("k"), Some(Value::Number(2.0)));
        // The slot is a fresh object, not the source's.
        assert!(!Value::same_ref(
            &target.get("n").unwrap(),
            &source.get("n").unwrap()
        ));
    }

    #[test]
    fn cyclic_source_terminates_and_maps_to_target() {
        let source = Value::object();
        source.set("name", Value::string("root"));
        source.set("self", source.clone());
        let target = Value::object();
        let merged = merge(&target, &source);
        assert_eq!(merged.get("name"), Some(Value::string("root")));
        assert!(Value::same_ref(&merged.get("self").unwrap(), &merged));
    }

    #[test]
    fn shared_source_subobjects_stay_shared() {
        let shared = obj(vec![("k", Value::Number(1.0))]);
        let source = obj(vec![("a", shared.clone()), ("b", shared)]);
        let target = Value::object();
        merge(&target, &source);
        let a = target.get("a").unwrap();
        let b = target.get("b").unwrap();
        assert!(Value::same_ref(&a, &b));
        assert_eq!(a.get("k"), Some(Value::Number(1.0)));
    }

    #[test]
    fn non_object_target_is_a_no_op() {
        let merged = merge(&Value::Null, &obj(vec![("a", Value::Number(1.0))]));
        assert!(merged.is_null());
        let merged = merge(&Value::Number(3.0), &Value::object());
        assert_eq!(merged, Value::Number(3.0));
    }

    #[test]
    fn non_object_sources_are_skipped() {
        let target = obj(vec![("a", Value::Number(1.0))]);
        let merged = merge_into(
            &target,
            &[Value::Null, Value::string("x"), Value::array(vec![])],
        );
        assert_eq!(merged.keys(), vec!["a"]);
    }
}
