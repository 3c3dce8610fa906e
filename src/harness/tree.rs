use std::collections::VecDeque;

use rhai::{Dynamic, Map};
use serde_json::Value;

/// Builds the object-map node shape submissions work with: `value`, `left`,
/// `right`, with `()` marking a missing child. The same shape is exposed to
/// scripts through the registered `tree_node` constructor.
pub fn node(value: Dynamic) -> Map {
    let mut map = Map::new();
    map.insert("value".into(), value);
    map.insert("left".into(), Dynamic::UNIT);
    map.insert("right".into(), Dynamic::UNIT);
    map
}

struct FlatNode {
    value: Value,
    left: Option<usize>,
    right: Option<usize>,
}

/// Converts a level-order array (JSON null marks a missing child) into a
/// linked node structure, e.g. `[3, 9, 20, null, null, 15, 7]` becomes a
/// five-node tree with 9 and 20 under the root and 15 and 7 under 20.
pub fn build_tree(level_order: &[Value]) -> Dynamic {
    if level_order.first().is_none_or(Value::is_null) {
        return Dynamic::UNIT;
    }

    let mut nodes = vec![FlatNode {
        value: level_order[0].clone(),
        left: None,
        right: None,
    }];
    let mut frontier = VecDeque::from([0usize]);
    let mut next = 1;

    while next < level_order.len() {
        let Some(parent) = frontier.pop_front() else {
            break;
        };

        if next < level_order.len() {
            if !level_order[next].is_null() {
                nodes.push(FlatNode {
                    value: level_order[next].clone(),
                    left: None,
                    right: None,
                });
                let child = nodes.len() - 1;
                nodes[parent].left = Some(child);
                frontier.push_back(child);
            }
            next += 1;
        }

        if next < level_order.len() {
            if !level_order[next].is_null() {
                nodes.push(FlatNode {
                    value: level_order[next].clone(),
                    left: None,
                    right: None,
                });
                let child = nodes.len() - 1;
                nodes[parent].right = Some(child);
                frontier.push_back(child);
            }
            next += 1;
        }
    }

    materialize(&nodes, 0)
}

fn materialize(nodes: &[FlatNode], index: usize) -> Dynamic {
    let mut map = Map::new();
    map.insert("value".into(), json_to_dynamic(&nodes[index].value));
    map.insert(
        "left".into(),
        nodes[index]
            .left
            .map_or(Dynamic::UNIT, |child| materialize(nodes, child)),
    );
    map.insert(
        "right".into(),
        nodes[index]
            .right
            .map_or(Dynamic::UNIT, |child| materialize(nodes, child)),
    );
    Dynamic::from(map)
}

fn json_to_dynamic(value: &Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}
