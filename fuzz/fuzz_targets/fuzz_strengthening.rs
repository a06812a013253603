#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};

use charter_consti::{assess, Strengthening};

#[derive(Arbitrary, Debug)]
enum Leaf {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Object(Vec<(String, bool)>),
}

impl Leaf {
    fn value(&self) -> Value {
        match self {
            Leaf::Null => Value::Null,
            Leaf::Bool(b) => json!(b),
            Leaf::Int(n) => json!(n),
            Leaf::Float(f) => json!(f),
            Leaf::Text(s) => json!(s),
            Leaf::List(items) => json!(items),
            Leaf::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect(),
            ),
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Input {
    path: String,
    old: Leaf,
    new: Leaf,
}

// The heuristic must be total, treat no-ops as undecided, and fold
// assessments without depending on order.
fuzz_target!(|input: Input| {
    let old = input.old.value();
    let new = input.new.value();

    let forward = assess(&input.path, &old, &new);
    assert_eq!(assess(&input.path, &old, &old), Strengthening::Indeterminate);

    let backward = assess(&input.path, &new, &old);
    assert_eq!(forward.combine(backward), backward.combine(forward));
    if forward == Strengthening::Weakens || backward == Strengthening::Weakens {
        assert_eq!(forward.combine(backward), Strengthening::Weakens);
    }
});
