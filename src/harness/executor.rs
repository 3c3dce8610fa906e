use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;

use super::input::{self, TestInput};
use super::tree;
use super::{ExecutionReport, TestCase, TestOutcome};

/// Preferred entry-point name. A submission defining several functions must
/// name one of them this; a single-function submission may call it anything.
const ENTRY_POINT_NAME: &str = "solve";

#[derive(Clone)]
struct EntryPoint {
    name: String,
    params: Vec<String>,
}

/// Runs `source` against `cases` in input order and assembles the report.
///
/// The script executes inside a fresh engine whose namespace carries exactly
/// two utility bindings: the `tree_node` constructor and the print/debug
/// primitives. All script output is captured and withheld; a runtime fault
/// folds the captured text into its error message. Each invocation is bounded
/// by `budget` through the engine's progress hook, which terminates the
/// script at the deadline instead of leaving it running.
pub fn evaluate(source: &str, cases: &[TestCase], budget: Duration) -> ExecutionReport {
    let total = cases.len() as u32;
    let captured = Arc::new(Mutex::new(String::new()));
    let deadline = Arc::new(Mutex::new(Instant::now() + budget));

    let mut engine = Engine::new();
    {
        let captured = Arc::clone(&captured);
        engine.on_print(move |text| {
            let mut buffer = captured.lock();
            buffer.push_str(text);
            buffer.push('\n');
        });
    }
    {
        let captured = Arc::clone(&captured);
        engine.on_debug(move |text, _source, _pos| {
            let mut buffer = captured.lock();
            buffer.push_str(text);
            buffer.push('\n');
        });
    }
    {
        let deadline = Arc::clone(&deadline);
        engine.on_progress(move |_ops| {
            if Instant::now() >= *deadline.lock() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });
    }
    engine.register_fn("tree_node", |value: Dynamic| tree::node(value));

    let ast = match engine.compile(source) {
        Ok(ast) => ast,
        Err(e) => return ExecutionReport::aborted(total, format!("Syntax error: {e}")),
    };

    // Run top-level statements once; the entry point must be resolvable from
    // the functions the script defines.
    let mut scope = Scope::new();
    *deadline.lock() = Instant::now() + budget;
    if let Err(e) = engine.run_ast_with_scope(&mut scope, &ast) {
        return ExecutionReport::aborted(total, format!("Execution error: {e}"));
    }
    let entry = match resolve_entry_point(&ast) {
        Ok(entry) => entry,
        Err(message) => return ExecutionReport::aborted(total, message),
    };

    let mut report = ExecutionReport {
        passed: 0,
        total,
        errors: Vec::new(),
        test_results: Vec::new(),
    };

    for case in cases {
        let mut outcome = TestOutcome {
            test_id: case.test_id.clone(),
            passed: false,
            error: None,
        };

        match input::parse_input(&case.input).and_then(|input| build_args(input, &entry.params)) {
            Err(message) => outcome.error = Some(format!("Test case error: {message}")),
            Ok(args) => {
                captured.lock().clear();
                *deadline.lock() = Instant::now() + budget;

                match engine.call_fn::<Dynamic>(&mut scope, &ast, &entry.name, args) {
                    Ok(value) => {
                        if outputs_match(&case.expected_output, &value) {
                            outcome.passed = true;
                            report.passed += 1;
                        }
                    }
                    Err(e) if is_timeout(&e) => {
                        outcome.error = Some("Execution timed out".to_string());
                    }
                    Err(e) => {
                        let diagnostics = captured.lock().clone();
                        outcome.error = Some(if diagnostics.trim().is_empty() {
                            format!("Runtime error: {e}")
                        } else {
                            format!("Runtime error: {e}\n{}", diagnostics.trim_end())
                        });
                    }
                }
            }
        }

        if let Some(error) = &outcome.error {
            report.errors.push(error.clone());
        }
        report.test_results.push(outcome);
    }

    report
}

fn resolve_entry_point(ast: &AST) -> Result<EntryPoint, String> {
    let mut functions: Vec<EntryPoint> = ast
        .iter_functions()
        .map(|f| EntryPoint {
            name: f.name.to_string(),
            params: f.params.iter().map(|p| p.to_string()).collect(),
        })
        .collect();

    if let Some(index) = functions.iter().position(|f| f.name == ENTRY_POINT_NAME) {
        return Ok(functions.swap_remove(index));
    }
    match functions.len() {
        0 => Err("No function found in the code".to_string()),
        1 => Ok(functions.remove(0)),
        _ => Err(format!(
            "Multiple functions defined; name the entry point `{ENTRY_POINT_NAME}`"
        )),
    }
}

/// Maps a decoded input onto the entry point's declared parameters. Named
/// fields bind by parameter name; a field called `tree` holding a level-order
/// array is converted into a linked node structure first.
fn build_args(input: TestInput, params: &[String]) -> Result<Vec<Dynamic>, String> {
    match input {
        TestInput::Scalar(value) => {
            if params.len() != 1 {
                return Err(format!(
                    "entry point expects {} arguments, got 1",
                    params.len()
                ));
            }
            Ok(vec![json_to_dynamic(value)?])
        }
        TestInput::Positional(values) => {
            // A one-parameter entry point receives the whole array.
            if params.len() == 1 {
                return Ok(vec![json_to_dynamic(Value::Array(values))?]);
            }
            if values.len() != params.len() {
                return Err(format!(
                    "entry point expects {} arguments, got {}",
                    params.len(),
                    values.len()
                ));
            }
            values.into_iter().map(json_to_dynamic).collect()
        }
        TestInput::Named(mut fields) => {
            for key in fields.keys() {
                if !params.iter().any(|p| p == key) {
                    return Err(format!("unknown argument `{key}`"));
                }
            }
            let mut args = Vec::with_capacity(params.len());
            for param in params {
                let value = fields
                    .remove(param)
                    .ok_or_else(|| format!("missing argument `{param}`"))?;
                if param == "tree" {
                    match value {
                        Value::Array(level_order) => args.push(tree::build_tree(&level_order)),
                        _ => return Err("Invalid input format: tree must be a level-order array"
                            .to_string()),
                    }
                } else {
                    args.push(json_to_dynamic(value)?);
                }
            }
            Ok(args)
        }
    }
}

fn json_to_dynamic(value: Value) -> Result<Dynamic, String> {
    rhai::serde::to_dynamic(&value).map_err(|e| format!("Invalid input format: {e}"))
}

fn is_timeout(error: &EvalAltResult) -> bool {
    matches!(error, EvalAltResult::ErrorTerminated(..))
}

/// Compares the returned value to the expected literal: structural equality
/// when the literal decodes as JSON, trimmed-string equality otherwise.
fn outputs_match(expected: &str, actual: &Dynamic) -> bool {
    if let Ok(expected_value) = serde_json::from_str::<Value>(expected) {
        if let Ok(actual_value) = rhai::serde::from_dynamic::<Value>(actual) {
            return json_eq(&expected_value, &actual_value);
        }
    }
    actual.to_string().trim() == expected.trim()
}

// Numbers compare by value so an integer literal matches a float result.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUDGET: Duration = Duration::from_secs(5);

    const MISSING_NUMBER: &str = r#"
fn solve(nums) {
    let n = nums.len() + 1;
    let expected = n * (n + 1) / 2;
    let actual = 0;
    for x in nums {
        actual += x;
    }
    expected - actual
}
"#;

    fn case(test_id: &str, input: &str, expected: &str) -> TestCase {
        TestCase {
            test_id: test_id.to_string(),
            input: input.to_string(),
            expected_output: expected.to_string(),
        }
    }

    #[test]
    fn correct_solution_passes_every_case() {
        let cases = vec![
            case("1", "[1, 2, 4, 5, 6]", "3"),
            case("2", "[3, 7, 1, 2, 8, 4, 5]", "6"),
        ];
        let report = evaluate(MISSING_NUMBER, &cases, BUDGET);
        assert_eq!(report.passed, report.total);
        assert!(report.errors.is_empty());
        assert!(report.test_results.iter().all(|r| r.passed));
    }

    #[test]
    fn wrong_answer_fails_without_error() {
        let cases = vec![case("1", "[1, 2, 4, 5, 6]", "42")];
        let report = evaluate(MISSING_NUMBER, &cases, BUDGET);
        assert_eq!(report.passed, 0);
        assert!(report.errors.is_empty());
        assert!(!report.test_results[0].passed);
        assert!(report.test_results[0].error.is_none());
    }

    #[test]
    fn named_fields_bind_to_parameters() {
        let source = "fn solve(a, b) { a + b }";
        let cases = vec![case("1", r#"{ "a": 2, "b": 3 }"#, "5")];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_named_field_is_a_per_test_error() {
        let source = "fn solve(a, b) { a + b }";
        let cases = vec![case("1", r#"{ "a": 2 }"#, "5")];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 0);
        assert!(report.errors[0].contains("missing argument `b`"));
    }

    #[test]
    fn tree_input_converts_before_invocation() {
        let source = "fn solve(tree) { tree.value + tree.right.left.value }";
        let cases = vec![case("1", r#"{ "tree": [3, 9, 20, null, null, 15, 7] }"#, "18")];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 1, "errors: {:?}", report.errors);
    }

    #[test]
    fn tree_node_constructor_is_available_to_submissions() {
        let source = r#"
fn solve(n) {
    let node = tree_node(n);
    node.value
}
"#;
        let cases = vec![case("1", "7", "7")];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 1, "errors: {:?}", report.errors);
    }

    #[test]
    fn syntax_error_aborts_the_whole_run() {
        let cases = vec![case("1", "[1]", "1"), case("2", "[2]", "2")];
        let report = evaluate("fn solve( {", &cases, BUDGET);
        assert_eq!(report.passed, 0);
        assert_eq!(report.total, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Syntax error:"));
        assert!(report.test_results.is_empty());
    }

    #[test]
    fn source_without_functions_aborts_the_whole_run() {
        let report = evaluate("let x = 1;", &[case("1", "[1]", "1")], BUDGET);
        assert_eq!(report.errors, vec!["No function found in the code".to_string()]);
        assert!(report.test_results.is_empty());
    }

    #[test]
    fn ambiguous_entry_point_requires_the_solve_name() {
        let ambiguous = "fn first(x) { x }\nfn second(x) { x }";
        let report = evaluate(ambiguous, &[case("1", "1", "1")], BUDGET);
        assert!(report.errors[0].contains("solve"));
        assert!(report.test_results.is_empty());

        let disambiguated = "fn helper(x) { x * 2 }\nfn solve(x) { helper(x) }";
        let report = evaluate(disambiguated, &[case("1", "3", "6")], BUDGET);
        assert_eq!(report.passed, 1);
    }

    #[test]
    fn infinite_loop_times_out_and_later_cases_still_run() {
        let source = r#"
fn solve(nums) {
    if nums[0] == 0 {
        loop { }
    }
    nums[0]
}
"#;
        let cases = vec![case("1", "[0]", "0"), case("2", "[9]", "9")];
        let report = evaluate(source, &cases, Duration::from_secs(1));
        assert_eq!(report.passed, 1);
        assert_eq!(report.errors, vec!["Execution timed out".to_string()]);
        assert_eq!(report.test_results.len(), 2);
        assert!(!report.test_results[0].passed);
        assert!(report.test_results[1].passed);
    }

    #[test]
    fn malformed_input_only_fails_its_own_case() {
        let cases = vec![
            case("1", "[1, 2, 4, 5, 6]", "3"),
            case("2", "{ not json", "0"),
            case("3", "[3, 7, 1, 2, 8, 4, 5]", "6"),
        ];
        let report = evaluate(MISSING_NUMBER, &cases, BUDGET);
        assert_eq!(report.passed, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Invalid input format"));
        assert!(report.test_results[0].passed);
        assert!(report.test_results[1].error.is_some());
        assert!(report.test_results[2].passed);
    }

    #[test]
    fn runtime_fault_folds_in_captured_output() {
        let source = r#"
fn solve(nums) {
    print("inspecting input");
    nums.no_such_method()
}
"#;
        let report = evaluate(source, &[case("1", "[1]", "1")], BUDGET);
        assert_eq!(report.passed, 0);
        let error = report.test_results[0].error.as_deref().unwrap();
        assert!(error.starts_with("Runtime error:"), "got: {error}");
        assert!(error.contains("inspecting input"), "got: {error}");
    }

    #[test]
    fn non_json_expected_literal_falls_back_to_string_equality() {
        let source = r#"fn solve(x) { "hello " + x }"#;
        let cases = vec![case("1", r#"{ "x": "world" }"#, "hello world")];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 1, "errors: {:?}", report.errors);
    }

    #[test]
    fn structural_equality_covers_nested_arrays() {
        let source = r#"
fn solve(tree) {
    let levels = [];
    let frontier = [tree];
    while frontier.len() > 0 {
        let values = [];
        let next = [];
        for node in frontier {
            values.push(node.value);
            if node.left != () { next.push(node.left); }
            if node.right != () { next.push(node.right); }
        }
        levels.push(values);
        frontier = next;
    }
    levels
}
"#;
        let cases = vec![case(
            "1",
            r#"{ "tree": [3, 9, 20, null, null, 15, 7] }"#,
            "[[3], [9, 20], [15, 7]]",
        )];
        let report = evaluate(source, &cases, BUDGET);
        assert_eq!(report.passed, 1, "errors: {:?}", report.errors);
    }
}
