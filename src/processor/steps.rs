//! The built-in steps a script may call and how their arguments are encoded.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepOpcode {
    Say = 0,
    ShowItem = 1,
    Pause = 2,
    Expression = 3,
    JumpIfNot = 4,
    Jump = 5,
    SetLocal = 6,
    SetScene = 7,
    SetGlobal = 8,
    Delay = 9,
    InteractWithNpc = 10,
    IdleNpc = 11,
    CameraLookAtNpc = 12,
    CameraFollow = 13,
    CameraReturn = 14,
    CameraAnimate = 15,
    CameraMoveTo = 16,
    CameraWait = 17,
    InteractWithLocation = 18,
    Fade = 19,
    InteractWithPosition = 20,
    NpcWait = 21,
    NpcSetSpeed = 22,
    ShowTitle = 23,
    LookAtSubject = 24,
    NpcAnimate = 25,
    Print = 26,
    Spawn = 27,
}

/// How one argument of a step is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// String with `{expr}` interpolations, evaluated at runtime.
    Template,
    /// Plain string literal.
    Str,
    U8,
    U16,
    F32,
    Bool,
    /// Integer evaluated at runtime and pushed by the preceding expression.
    Int,
}

impl ArgKind {
    pub fn describe(self) -> &'static str {
        match self {
            ArgKind::Template => "string",
            ArgKind::Str => "constant string",
            ArgKind::U8 | ArgKind::U16 => "constant int",
            ArgKind::F32 => "constant float",
            ArgKind::Bool => "constant bool",
            ArgKind::Int => "int",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub name: &'static str,
    pub opcode: StepOpcode,
    pub args: &'static [ArgKind],
    /// Index of the argument naming an actor that must be idled once the
    /// cutscene finishes.
    pub idle_actor: Option<usize>,
}

const fn step(name: &'static str, opcode: StepOpcode, args: &'static [ArgKind]) -> StepDefinition {
    StepDefinition {
        name,
        opcode,
        args,
        idle_actor: None,
    }
}

const fn interaction(
    name: &'static str,
    opcode: StepOpcode,
    args: &'static [ArgKind],
) -> StepDefinition {
    StepDefinition {
        name,
        opcode,
        args,
        idle_actor: Some(1),
    }
}

use ArgKind::*;

pub const STEPS: &[StepDefinition] = &[
    step("say", StepOpcode::Say, &[Template]),
    step("show_item", StepOpcode::ShowItem, &[U16]),
    step("pause", StepOpcode::Pause, &[Bool, Bool]),
    step("delay", StepOpcode::Delay, &[F32]),
    interaction("interact_with_npc", StepOpcode::InteractWithNpc, &[U8, U16, U16]),
    step("idle_npc", StepOpcode::IdleNpc, &[U16]),
    step("camera_look_at_npc", StepOpcode::CameraLookAtNpc, &[U16]),
    step("camera_follow", StepOpcode::CameraFollow, &[]),
    step("camera_return", StepOpcode::CameraReturn, &[]),
    step("camera_animate", StepOpcode::CameraAnimate, &[Str]),
    step("camera_move_to", StepOpcode::CameraMoveTo, &[F32, F32, F32, Bool, Bool]),
    step("camera_wait", StepOpcode::CameraWait, &[]),
    interaction(
        "interact_with_location",
        StepOpcode::InteractWithLocation,
        &[U8, U16, Str],
    ),
    step("fade", StepOpcode::Fade, &[U8, F32]),
    interaction(
        "interact_with_position",
        StepOpcode::InteractWithPosition,
        &[U8, U16, F32, F32, F32],
    ),
    step("npc_wait", StepOpcode::NpcWait, &[U16]),
    step("npc_set_speed", StepOpcode::NpcSetSpeed, &[U16, F32]),
    step("show_title", StepOpcode::ShowTitle, &[Str]),
    step("look_at_subject", StepOpcode::LookAtSubject, &[]),
    step("npc_animate", StepOpcode::NpcAnimate, &[U16, Str, Bool]),
    step("print", StepOpcode::Print, &[Template]),
    step("spawn", StepOpcode::Spawn, &[Int]),
];

/// Name of the step that ends the cutscene early.
pub const EXIT_STEP: &str = "exit";

pub fn lookup(name: &str) -> Option<&'static StepDefinition> {
    STEPS.iter().find(|s| s.name == name)
}

/// Longest string the length prefix can describe.
pub const MAX_STRING_LEN: usize = 0x7fff;

/// Length-prefixed string: one byte below 128, otherwise the low seven bits
/// with the top bit set followed by the remaining bits.
pub fn encode_string(text: &str, out: &mut Vec<u8>) -> Result<(), String> {
    let len = text.len();
    if len > MAX_STRING_LEN {
        return Err(format!(
            "string is too long, {len} bytes instead of at most {MAX_STRING_LEN}"
        ));
    }

    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.push(0x80 | (len & 0x7f) as u8);
        out.push((len >> 7) as u8);
    }
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

/// `printf`-style template: argument count then the string.
pub fn encode_template(template: &str, nargs: u8, out: &mut Vec<u8>) -> Result<(), String> {
    out.push(nargs);
    encode_string(template, out)
}

/// Doubles `%` so literal text survives the VM's formatter.
pub fn escape_template(text: &str) -> String {
    text.replace('%', "%%")
}
