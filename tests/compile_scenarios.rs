use std::fs;
use std::path::Path;

use cutscenec::parser::{self, HeaderDefinitions};
use cutscenec::processor::blob::{self, RawStep};
use cutscenec::processor::layout::BuiltinTypes;
use cutscenec::processor::{self, CompileError, Source};

fn compile(src: &str) -> anyhow::Result<Vec<u8>> {
    let source = Source::new(src, "scenario.cut");
    Ok(processor::compile(&source, None, &BuiltinTypes)?.blob)
}

fn steps(src: &str) -> Vec<RawStep> {
    let blob = compile(src).expect("compiles");
    blob::disassemble(&blob).expect("decodes").steps
}

fn opcodes(steps: &[RawStep]) -> Vec<u8> {
    steps.iter().map(|s| s.opcode).collect()
}

#[test]
fn folds_global_assignment() {
    let blob = compile("global a: i32; a = 3 + 4;").expect("compiles");
    assert_eq!(
        blob,
        vec![
            b'C', b'T', b'S', b'N', 0, 2, 0, 0, // header, no locals
            3, b'E', b'X', b'P', b'R', 0, 6, 4, 0, 0, 0, 7, 0, // push 7
            8, 0, 3, 0, 0, // set_global i32 word 0
        ]
    );
}

#[test]
fn branches_jump_past_each_other() {
    let steps = steps("local a: i32; if a > 3 then say \"big\"; else say \"small\"; end");
    assert_eq!(opcodes(&steps), vec![3, 4, 0, 5, 0]);

    // offsets are relative to the step after the jump
    assert_eq!(steps[1].jump_offset(), Some(2));
    assert_eq!(steps[3].jump_offset(), Some(1));
    assert_eq!(&steps[2].payload[2..], b"big");
    assert_eq!(&steps[4].payload[2..], b"small");
}

#[test]
fn folds_interpolation() {
    let steps = steps("say \"value is {1+2}\";");
    assert_eq!(opcodes(&steps), vec![3, 0]);
    assert_eq!(
        steps[0].payload,
        vec![b'E', b'X', b'P', b'R', 0, 6, 4, 0, 0, 0, 3, 0]
    );

    let mut say = vec![1, 11];
    say.extend_from_slice(b"value is %d");
    assert_eq!(steps[1].payload, say);
}

#[test]
fn rejects_string_assignment() {
    let err = compile("global a: i32; a = \"text\";").unwrap_err();
    let compile_error = err.downcast_ref::<CompileError>().expect("compile error");

    assert!(matches!(compile_error, CompileError::Semantic(_)));
    assert!(
        compile_error
            .messages()
            .iter()
            .any(|m| m.contains("can only assign numerical types")),
        "{compile_error}"
    );
}

#[test]
fn idles_each_actor_once() {
    let steps = steps("interact_with_npc 1, 2, 3; interact_with_npc 1, 2, 3;");
    assert_eq!(opcodes(&steps), vec![10, 10, 11]);
    assert_eq!(steps[2].payload, vec![0, 2]);
}

#[test]
fn folds_division_by_type() {
    let steps = steps("local x: i32; local y: float; x = 7 / 2; y = 7.0 / 2;");
    assert_eq!(
        steps[0].payload,
        vec![b'E', b'X', b'P', b'R', 0, 6, 4, 0, 0, 0, 3, 0]
    );
    assert_eq!(
        steps[2].payload,
        vec![b'E', b'X', b'P', b'R', 0, 6, 4, 0x40, 0x60, 0, 0, 0]
    );
}

#[test]
fn mirrors_less_than() {
    let steps = steps("local a: i32; local b: i32; if a < b then exit; end");
    // a < b becomes b > a: right operand first, then left
    assert_eq!(
        steps[0].payload,
        vec![
            b'E', b'X', b'P', b'R', 0, 12, //
            1, 0, 3, 0, 0, // load a
            1, 0, 3, 0, 1, // load b
            10, 0,
        ]
    );
}

#[test]
fn output_is_deterministic() {
    let src = fs::read_to_string("tests/scripts/intro.cut").expect("fixture");
    let first = compile(&src).expect("compiles");
    let second = compile(&src).expect("compiles");
    assert_eq!(first, second);
}

#[test]
fn compiles_against_shared_globals() {
    let source = parser::load_source(Path::new("tests/scripts/intro.cut")).expect("fixture");
    let json = fs::read_to_string("tests/globals.json").expect("fixture");
    let globals = parser::load_layout_from_json(&json, &BuiltinTypes).expect("valid layout");

    let compiled = processor::compile(&source, Some(&globals), &BuiltinTypes).expect("compiles");
    assert_eq!(compiled.globals, globals);

    let decoded = blob::disassemble(&compiled.blob).expect("decodes");
    assert_eq!(decoded.locals, b"hi\0\0\0\0\0\0".to_vec());
    assert_eq!(
        opcodes(&decoded.steps),
        vec![3, 4, 5, 3, 8, 3, 7, 3, 0, 10, 11]
    );

    // if seen_intro: skip the exit jump, which lands on the trailing idle
    assert_eq!(decoded.steps[1].jump_offset(), Some(1));
    assert_eq!(decoded.steps[2].jump_offset(), Some(7));
    assert_eq!(decoded.steps[4].payload, vec![0, 4, 0, 0]);

    let mut say = vec![2, 12];
    say.extend_from_slice(b"%s, score %d");
    assert_eq!(decoded.steps[8].payload, say);
}

#[test]
fn rejects_globals_missing_from_layout() {
    let json = fs::read_to_string("tests/globals.json").expect("fixture");
    let globals = parser::load_layout_from_json(&json, &BuiltinTypes).expect("valid layout");

    let test_cases = vec![
        ("global unknown: i32;", "unknown is missing from the global layout"),
        (
            "global score: i16;",
            "redefinition of variable with mismatched type, i32 was i16",
        ),
    ];

    for (src, message) in test_cases {
        let source = Source::new(src, "scenario.cut");
        let err = processor::compile(&source, Some(&globals), &BuiltinTypes).unwrap_err();
        assert!(format!("{err:#}").contains(message), "{err:#} should contain {message}");
    }
}

#[test]
fn uses_header_definitions() {
    let definitions = HeaderDefinitions::parse(
        "enum fade_colors { FADE_BLACK, FADE_WHITE = 0x10 };\ntypedef uint8_t room_id;",
    )
    .expect("parses");

    let source = Source::new("local room: room_id = 3; fade FADE_WHITE, 0.5;", "scenario.cut");
    let compiled = processor::compile(&source, None, &definitions).expect("compiles");

    let decoded = blob::disassemble(&compiled.blob).expect("decodes");
    assert_eq!(decoded.locals, vec![3]);
    assert_eq!(decoded.steps[0].payload, vec![0x10, 0x3f, 0, 0, 0]);

    let err = processor::compile(&source, None, &BuiltinTypes).unwrap_err();
    assert!(format!("{err:#}").contains("invalid type room_id"), "{err:#}");
}

#[test]
fn reports_layout_errors_of_every_scope() {
    let err = compile("global a: u64;\nlocal b: u64;\nscene c: u64;").unwrap_err();
    let messages = err.downcast_ref::<CompileError>().expect("compile error").messages();

    assert_eq!(messages.len(), 3, "{messages:?}");
    assert!(messages[0].starts_with("scenario.cut:1:11: invalid type u64"));
    assert!(messages[1].starts_with("scenario.cut:3:10: invalid type u64"));
    assert!(messages[2].starts_with("scenario.cut:2:10: invalid type u64"));
}

#[test]
fn reports_shared_global_and_local_errors_together() {
    let json = fs::read_to_string("tests/globals.json").expect("fixture");
    let globals = parser::load_layout_from_json(&json, &BuiltinTypes).expect("valid layout");

    let source = Source::new("global unknown: i32;\nlocal s: char[600000000];", "scenario.cut");
    let err = processor::compile(&source, Some(&globals), &BuiltinTypes).unwrap_err();
    let messages = err.downcast_ref::<CompileError>().expect("compile error").messages();

    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages[0].contains("unknown is missing from the global layout"));
    assert!(messages[1].contains("array too large"));
}

#[test]
fn reports_type_and_step_errors_together() {
    let err = compile("local a: i32;\na = missing;\ndance 1;").unwrap_err();
    let messages = err.downcast_ref::<CompileError>().expect("compile error").messages();

    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages[0].starts_with("scenario.cut:2:5: the variable missing is not defined"));
    assert!(messages[1].starts_with("scenario.cut:3:1: dance is not a valid step name"));
}
