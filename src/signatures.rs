//! Opcode signature table: which slots an opcode reads, in order, and how the
//! opcode is shaped (plain call, branch-bearing construct or hat).

use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Plain,
    /// Control construct with nested bodies, named by their input sockets.
    Branch(Vec<String>),
    Hat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Slot names in emission order. A slot is looked up in the block's
    /// inputs first, then in its fields.
    pub slots: Vec<String>,
    pub category: Category,
}

impl Signature {
    pub fn plain(slots: &[&str]) -> Self {
        Self {
            slots: slots.iter().map(|s| s.to_string()).collect(),
            category: Category::Plain,
        }
    }

    pub fn hat(slots: &[&str]) -> Self {
        Self {
            slots: slots.iter().map(|s| s.to_string()).collect(),
            category: Category::Hat,
        }
    }

    pub fn branch(slots: &[&str], sockets: &[&str]) -> Self {
        Self {
            slots: slots.iter().map(|s| s.to_string()).collect(),
            category: Category::Branch(sockets.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn is_hat(&self) -> bool {
        self.category == Category::Hat
    }
}

/// One block entry reported by an extension descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionBlock {
    pub opcode: String,
    pub argument_names: Vec<String>,
    pub block_type: String,
}

#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: IndexMap<String, Signature>,
}

enum Shape {
    Plain,
    Hat,
    Branch(&'static [&'static str]),
}

const SUBSTACK: &[&str] = &["SUBSTACK"];

#[rustfmt::skip]
const BUILTINS: &[(&str, &[&str], Shape)] = &[
    // motion
    ("motion_movesteps", &["STEPS"], Shape::Plain),
    ("motion_turnright", &["DEGREES"], Shape::Plain),
    ("motion_turnleft", &["DEGREES"], Shape::Plain),
    ("motion_goto", &["TO"], Shape::Plain),
    ("motion_gotoxy", &["X", "Y"], Shape::Plain),
    ("motion_glideto", &["SECS", "TO"], Shape::Plain),
    ("motion_glidesecstoxy", &["SECS", "X", "Y"], Shape::Plain),
    ("motion_pointindirection", &["DIRECTION"], Shape::Plain),
    ("motion_pointtowards", &["TOWARDS"], Shape::Plain),
    ("motion_changexby", &["DX"], Shape::Plain),
    ("motion_setx", &["X"], Shape::Plain),
    ("motion_changeyby", &["DY"], Shape::Plain),
    ("motion_sety", &["Y"], Shape::Plain),
    ("motion_ifonedgebounce", &[], Shape::Plain),
    ("motion_setrotationstyle", &["STYLE"], Shape::Plain),
    ("motion_xposition", &[], Shape::Plain),
    ("motion_yposition", &[], Shape::Plain),
    ("motion_direction", &[], Shape::Plain),
    // looks
    ("looks_sayforsecs", &["MESSAGE", "SECS"], Shape::Plain),
    ("looks_say", &["MESSAGE"], Shape::Plain),
    ("looks_thinkforsecs", &["MESSAGE", "SECS"], Shape::Plain),
    ("looks_think", &["MESSAGE"], Shape::Plain),
    ("looks_switchcostumeto", &["COSTUME"], Shape::Plain),
    ("looks_nextcostume", &[], Shape::Plain),
    ("looks_switchbackdropto", &["BACKDROP"], Shape::Plain),
    ("looks_switchbackdroptoandwait", &["BACKDROP"], Shape::Plain),
    ("looks_nextbackdrop", &[], Shape::Plain),
    ("looks_changesizeby", &["CHANGE"], Shape::Plain),
    ("looks_setsizeto", &["SIZE"], Shape::Plain),
    ("looks_changeeffectby", &["EFFECT", "CHANGE"], Shape::Plain),
    ("looks_seteffectto", &["EFFECT", "VALUE"], Shape::Plain),
    ("looks_cleargraphiceffects", &[], Shape::Plain),
    ("looks_show", &[], Shape::Plain),
    ("looks_hide", &[], Shape::Plain),
    ("looks_gotofrontback", &["FRONT_BACK"], Shape::Plain),
    ("looks_goforwardbackwardlayers", &["FORWARD_BACKWARD", "NUM"], Shape::Plain),
    ("looks_costumenumbername", &["NUMBER_NAME"], Shape::Plain),
    ("looks_backdropnumbername", &["NUMBER_NAME"], Shape::Plain),
    ("looks_size", &[], Shape::Plain),
    // sound
    ("sound_playuntildone", &["SOUND_MENU"], Shape::Plain),
    ("sound_play", &["SOUND_MENU"], Shape::Plain),
    ("sound_stopallsounds", &[], Shape::Plain),
    ("sound_changeeffectby", &["EFFECT", "VALUE"], Shape::Plain),
    ("sound_seteffectto", &["EFFECT", "VALUE"], Shape::Plain),
    ("sound_cleareffects", &[], Shape::Plain),
    ("sound_changevolumeby", &["VOLUME"], Shape::Plain),
    ("sound_setvolumeto", &["VOLUME"], Shape::Plain),
    ("sound_volume", &[], Shape::Plain),
    // events
    ("event_whenflagclicked", &[], Shape::Hat),
    ("event_whenkeypressed", &["KEY_OPTION"], Shape::Hat),
    ("event_whenthisspriteclicked", &[], Shape::Hat),
    ("event_whenstageclicked", &[], Shape::Hat),
    ("event_whenbackdropswitchesto", &["BACKDROP"], Shape::Hat),
    ("event_whengreaterthan", &["WHENGREATERTHANMENU", "VALUE"], Shape::Hat),
    ("event_whenbroadcastreceived", &["BROADCAST_OPTION"], Shape::Hat),
    ("event_whentouchingobject", &["TOUCHINGOBJECTMENU"], Shape::Hat),
    ("event_broadcast", &["BROADCAST_INPUT"], Shape::Plain),
    ("event_broadcastandwait", &["BROADCAST_INPUT"], Shape::Plain),
    // control
    ("control_wait", &["DURATION"], Shape::Plain),
    ("control_repeat", &["TIMES"], Shape::Branch(SUBSTACK)),
    ("control_forever", &[], Shape::Branch(SUBSTACK)),
    ("control_if", &["CONDITION"], Shape::Branch(SUBSTACK)),
    ("control_if_else", &["CONDITION"], Shape::Branch(&["SUBSTACK", "SUBSTACK2"])),
    ("control_wait_until", &["CONDITION"], Shape::Plain),
    ("control_repeat_until", &["CONDITION"], Shape::Branch(SUBSTACK)),
    ("control_while", &["CONDITION"], Shape::Branch(SUBSTACK)),
    ("control_for_each", &["VARIABLE", "VALUE"], Shape::Branch(SUBSTACK)),
    ("control_all_at_once", &[], Shape::Branch(SUBSTACK)),
    ("control_stop", &["STOP_OPTION"], Shape::Plain),
    ("control_start_as_clone", &[], Shape::Hat),
    ("control_create_clone_of", &["CLONE_OPTION"], Shape::Plain),
    ("control_delete_this_clone", &[], Shape::Plain),
    ("control_get_counter", &[], Shape::Plain),
    ("control_incr_counter", &[], Shape::Plain),
    ("control_clear_counter", &[], Shape::Plain),
    // sensing
    ("sensing_touchingobject", &["TOUCHINGOBJECTMENU"], Shape::Plain),
    ("sensing_touchingcolor", &["COLOR"], Shape::Plain),
    ("sensing_coloristouchingcolor", &["COLOR", "COLOR2"], Shape::Plain),
    ("sensing_distanceto", &["DISTANCETOMENU"], Shape::Plain),
    ("sensing_askandwait", &["QUESTION"], Shape::Plain),
    ("sensing_answer", &[], Shape::Plain),
    ("sensing_keypressed", &["KEY_OPTION"], Shape::Plain),
    ("sensing_mousedown", &[], Shape::Plain),
    ("sensing_mousex", &[], Shape::Plain),
    ("sensing_mousey", &[], Shape::Plain),
    ("sensing_setdragmode", &["DRAG_MODE"], Shape::Plain),
    ("sensing_loudness", &[], Shape::Plain),
    ("sensing_loud", &[], Shape::Plain),
    ("sensing_timer", &[], Shape::Plain),
    ("sensing_resettimer", &[], Shape::Plain),
    ("sensing_of", &["PROPERTY", "OBJECT"], Shape::Plain),
    ("sensing_current", &["CURRENTMENU"], Shape::Plain),
    ("sensing_dayssince2000", &[], Shape::Plain),
    ("sensing_username", &[], Shape::Plain),
    ("sensing_userid", &[], Shape::Plain),
    // operators
    ("operator_add", &["NUM1", "NUM2"], Shape::Plain),
    ("operator_subtract", &["NUM1", "NUM2"], Shape::Plain),
    ("operator_multiply", &["NUM1", "NUM2"], Shape::Plain),
    ("operator_divide", &["NUM1", "NUM2"], Shape::Plain),
    ("operator_mod", &["NUM1", "NUM2"], Shape::Plain),
    ("operator_random", &["FROM", "TO"], Shape::Plain),
    ("operator_gt", &["OPERAND1", "OPERAND2"], Shape::Plain),
    ("operator_lt", &["OPERAND1", "OPERAND2"], Shape::Plain),
    ("operator_equals", &["OPERAND1", "OPERAND2"], Shape::Plain),
    ("operator_and", &["OPERAND1", "OPERAND2"], Shape::Plain),
    ("operator_or", &["OPERAND1", "OPERAND2"], Shape::Plain),
    ("operator_not", &["OPERAND"], Shape::Plain),
    ("operator_join", &["STRING1", "STRING2"], Shape::Plain),
    ("operator_letter_of", &["LETTER", "STRING"], Shape::Plain),
    ("operator_length", &["STRING"], Shape::Plain),
    ("operator_contains", &["STRING1", "STRING2"], Shape::Plain),
    ("operator_round", &["NUM"], Shape::Plain),
    ("operator_mathop", &["OPERATOR", "NUM"], Shape::Plain),
    // data
    ("data_variable", &["VARIABLE"], Shape::Plain),
    ("data_setvariableto", &["VARIABLE", "VALUE"], Shape::Plain),
    ("data_changevariableby", &["VARIABLE", "VALUE"], Shape::Plain),
    ("data_showvariable", &["VARIABLE"], Shape::Plain),
    ("data_hidevariable", &["VARIABLE"], Shape::Plain),
    ("data_listcontents", &["LIST"], Shape::Plain),
    ("data_addtolist", &["ITEM", "LIST"], Shape::Plain),
    ("data_deleteoflist", &["INDEX", "LIST"], Shape::Plain),
    ("data_deletealloflist", &["LIST"], Shape::Plain),
    ("data_insertatlist", &["ITEM", "INDEX", "LIST"], Shape::Plain),
    ("data_replaceitemoflist", &["INDEX", "LIST", "ITEM"], Shape::Plain),
    ("data_itemoflist", &["INDEX", "LIST"], Shape::Plain),
    ("data_itemnumoflist", &["ITEM", "LIST"], Shape::Plain),
    ("data_lengthoflist", &["LIST"], Shape::Plain),
    ("data_listcontainsitem", &["LIST", "ITEM"], Shape::Plain),
    ("data_showlist", &["LIST"], Shape::Plain),
    ("data_hidelist", &["LIST"], Shape::Plain),
    // pen
    ("pen_clear", &[], Shape::Plain),
    ("pen_stamp", &[], Shape::Plain),
    ("pen_penDown", &[], Shape::Plain),
    ("pen_penUp", &[], Shape::Plain),
    ("pen_setPenColorToColor", &["COLOR"], Shape::Plain),
    ("pen_changePenColorParamBy", &["COLOR_PARAM", "VALUE"], Shape::Plain),
    ("pen_setPenColorParamTo", &["COLOR_PARAM", "VALUE"], Shape::Plain),
    ("pen_changePenSizeBy", &["SIZE"], Shape::Plain),
    ("pen_setPenSizeTo", &["SIZE"], Shape::Plain),
    ("pen_setPenShadeToNumber", &["SHADE"], Shape::Plain),
    ("pen_changePenShadeBy", &["SHADE"], Shape::Plain),
    ("pen_setPenHueToNumber", &["HUE"], Shape::Plain),
    ("pen_changePenHueBy", &["HUE"], Shape::Plain),
    // music
    ("music_playDrumForBeats", &["DRUM", "BEATS"], Shape::Plain),
    ("music_restForBeats", &["BEATS"], Shape::Plain),
    ("music_playNoteForBeats", &["NOTE", "BEATS"], Shape::Plain),
    ("music_setInstrument", &["INSTRUMENT"], Shape::Plain),
    ("music_setTempo", &["TEMPO"], Shape::Plain),
    ("music_changeTempo", &["TEMPO"], Shape::Plain),
    ("music_getTempo", &[], Shape::Plain),
];

/// Extension ids whose blocks already live in the built-in table.
pub const BUNDLED_EXTENSIONS: &[&str] = &["pen", "music"];

/// Shadow menus of the core palette that do not follow the `_menu_` naming.
const SHADOW_MENUS: &[&str] = &["looks_costume", "looks_backdrops", "sensing_keyoptions", "note"];

/// Dropdown blocks carry no computation; they render as their selected value.
/// A bare `menu` suffix only counts on shadow blocks, since extension opcodes
/// may end in `menu` too.
pub fn is_menu_block(opcode: &str, shadow: bool) -> bool {
    opcode.contains("_menu_")
        || SHADOW_MENUS.contains(&opcode)
        || (shadow && opcode.ends_with("menu"))
}

impl SignatureTable {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (opcode, slots, shape) in BUILTINS {
            let signature = match shape {
                Shape::Plain => Signature::plain(slots),
                Shape::Hat => Signature::hat(slots),
                Shape::Branch(sockets) => Signature::branch(slots, sockets),
            };
            table.insert(*opcode, signature);
        }
        table
    }

    pub fn insert(&mut self, opcode: impl Into<String>, signature: Signature) {
        self.entries.insert(opcode.into(), signature);
    }

    pub fn lookup(&self, opcode: &str) -> Option<&Signature> {
        self.entries.get(opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds an extension's blocks in as `<extension_id>_<opcode>`. Event and
    /// hat block types become entry points; everything else is a plain call
    /// with one slot per declared argument.
    pub fn extend_with(&mut self, extension_id: &str, blocks: &[ExtensionBlock]) {
        for block in blocks {
            let slots = block.argument_names.clone();
            let category = match block.block_type.as_str() {
                "event" | "hat" => Category::Hat,
                _ => Category::Plain,
            };
            let opcode = format!("{}_{}", extension_id, block.opcode);
            debug!(%opcode, slots = slots.len(), "registering extension block");
            self.insert(opcode, Signature { slots, category });
        }
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_branches_declare_their_sockets() {
        let table = SignatureTable::builtin();
        let if_else = table.lookup("control_if_else").unwrap();
        assert_eq!(
            if_else.category,
            Category::Branch(vec!["SUBSTACK".into(), "SUBSTACK2".into()])
        );
        assert_eq!(if_else.slots, vec!["CONDITION"]);
        assert!(table.lookup("event_whenflagclicked").unwrap().is_hat());
        assert!(table.lookup("procedures_call").is_none());
    }

    #[test]
    fn extension_blocks_are_prefixed_and_categorised() {
        let mut table = SignatureTable::empty();
        table.extend_with(
            "fetch",
            &[
                ExtensionBlock {
                    opcode: "get".into(),
                    argument_names: vec!["URL".into()],
                    block_type: "reporter".into(),
                },
                ExtensionBlock {
                    opcode: "whenLoaded".into(),
                    argument_names: vec![],
                    block_type: "event".into(),
                },
            ],
        );
        assert_eq!(table.lookup("fetch_get"), Some(&Signature::plain(&["URL"])));
        assert!(table.lookup("fetch_whenLoaded").unwrap().is_hat());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn recognises_menu_opcodes() {
        assert!(is_menu_block("pen_menu_colorParam", false));
        assert!(is_menu_block("motion_goto_menu", true));
        assert!(is_menu_block("sensing_touchingobjectmenu", true));
        assert!(is_menu_block("looks_costume", false));
        assert!(!is_menu_block("looks_costumenumbername", true));
        assert!(!is_menu_block("motion_goto", false));
    }

    #[test]
    fn menu_suffix_needs_a_shadow_block() {
        assert!(!is_menu_block("strings_submenu", false));
        assert!(!is_menu_block("motion_goto_menu", false));
        assert!(is_menu_block("strings_submenu", true));
    }
}
