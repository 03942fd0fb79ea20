// Copyright (c) 2024-2026 The shannon developers

//! The table of SystemVerilog keywords, parameterized by keyword version.
//!
//! The set of reserved words depends on the language version in effect,
//! which the user can change mid-stream with `` `begin_keywords ``. Each
//! keyword records the version that introduced it; a word is reserved under
//! a given version if that version is at least the introducing one.

/// The keyword versions selectable via `` `begin_keywords ``, in
/// chronological order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum KeywordVersion {
    V1364_1995,
    V1364_2001,
    V1364_2005,
    V1800_2005,
    V1800_2009,
    V1800_2012,
    V1800_2017,
}

impl KeywordVersion {
    /// Map a `` `begin_keywords `` version string to a keyword version.
    pub fn from_version_token(s: &str) -> Option<KeywordVersion> {
        match s {
            "1364-1995" => Some(KeywordVersion::V1364_1995),
            "1364-2001" | "1364-2001-noconfig" => Some(KeywordVersion::V1364_2001),
            "1364-2005" => Some(KeywordVersion::V1364_2005),
            "1800-2005" => Some(KeywordVersion::V1800_2005),
            "1800-2009" => Some(KeywordVersion::V1800_2009),
            "1800-2012" => Some(KeywordVersion::V1800_2012),
            "1800-2017" => Some(KeywordVersion::V1800_2017),
            _ => None,
        }
    }
}

impl Default for KeywordVersion {
    fn default() -> KeywordVersion {
        KeywordVersion::V1800_2017
    }
}

macro_rules! declare_keywords {(
    $( ($konst: ident, $string: expr, $version: ident) )*
) => {
    /// A language keyword.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub enum Kw {
        $($konst,)*
    }

    impl Kw {
        /// The source spelling of this keyword.
        pub fn as_str(self) -> &'static str {
            match self {
                $(Kw::$konst => $string,)*
            }
        }

        /// The keyword version that introduced this keyword.
        pub fn introduced_in(self) -> KeywordVersion {
            match self {
                $(Kw::$konst => KeywordVersion::$version,)*
            }
        }
    }

    /// Look up a keyword by its spelling, honoring the active keyword
    /// version. Words introduced by a later version are plain identifiers.
    pub fn find_keyword(name: &str, version: KeywordVersion) -> Option<Kw> {
        let kw = match name {
            $($string => Kw::$konst,)*
            _ => return None,
        };
        if version >= kw.introduced_in() {
            Some(kw)
        } else {
            None
        }
    }
}}

declare_keywords! {
    // IEEE 1364-1995
    (Always,        "always",        V1364_1995)
    (And,           "and",           V1364_1995)
    (Assign,        "assign",        V1364_1995)
    (Begin,         "begin",         V1364_1995)
    (Buf,           "buf",           V1364_1995)
    (Case,          "case",          V1364_1995)
    (Casex,         "casex",         V1364_1995)
    (Casez,         "casez",         V1364_1995)
    (Deassign,      "deassign",      V1364_1995)
    (Default,       "default",       V1364_1995)
    (Defparam,      "defparam",      V1364_1995)
    (Disable,       "disable",       V1364_1995)
    (Edge,          "edge",          V1364_1995)
    (Else,          "else",          V1364_1995)
    (End,           "end",           V1364_1995)
    (Endcase,       "endcase",       V1364_1995)
    (Endfunction,   "endfunction",   V1364_1995)
    (Endmodule,     "endmodule",     V1364_1995)
    (Endprimitive,  "endprimitive",  V1364_1995)
    (Endspecify,    "endspecify",    V1364_1995)
    (Endtable,      "endtable",      V1364_1995)
    (Endtask,       "endtask",       V1364_1995)
    (Event,         "event",         V1364_1995)
    (For,           "for",           V1364_1995)
    (Force,         "force",         V1364_1995)
    (Forever,       "forever",       V1364_1995)
    (Fork,          "fork",          V1364_1995)
    (Function,      "function",      V1364_1995)
    (If,            "if",            V1364_1995)
    (Initial,       "initial",       V1364_1995)
    (Inout,         "inout",         V1364_1995)
    (Input,         "input",         V1364_1995)
    (Integer,       "integer",       V1364_1995)
    (Join,          "join",          V1364_1995)
    (Macromodule,   "macromodule",   V1364_1995)
    (Module,        "module",        V1364_1995)
    (Nand,          "nand",          V1364_1995)
    (Negedge,       "negedge",       V1364_1995)
    (Nor,           "nor",           V1364_1995)
    (Not,           "not",           V1364_1995)
    (Or,            "or",            V1364_1995)
    (Output,        "output",        V1364_1995)
    (Parameter,     "parameter",     V1364_1995)
    (Posedge,       "posedge",       V1364_1995)
    (Primitive,     "primitive",     V1364_1995)
    (Real,          "real",          V1364_1995)
    (Realtime,      "realtime",      V1364_1995)
    (Reg,           "reg",           V1364_1995)
    (Release,       "release",       V1364_1995)
    (Repeat,        "repeat",        V1364_1995)
    (Scalared,      "scalared",      V1364_1995)
    (Specify,       "specify",       V1364_1995)
    (Specparam,     "specparam",     V1364_1995)
    (Supply0,       "supply0",       V1364_1995)
    (Supply1,       "supply1",       V1364_1995)
    (Table,         "table",         V1364_1995)
    (Task,          "task",          V1364_1995)
    (Time,          "time",          V1364_1995)
    (Tri,           "tri",           V1364_1995)
    (Tri0,          "tri0",          V1364_1995)
    (Tri1,          "tri1",          V1364_1995)
    (Triand,        "triand",        V1364_1995)
    (Trior,         "trior",         V1364_1995)
    (Trireg,        "trireg",        V1364_1995)
    (Vectored,      "vectored",      V1364_1995)
    (Wait,          "wait",          V1364_1995)
    (Wand,          "wand",          V1364_1995)
    (While,         "while",         V1364_1995)
    (Wire,          "wire",          V1364_1995)
    (Wor,           "wor",           V1364_1995)
    (Xnor,          "xnor",          V1364_1995)
    (Xor,           "xor",           V1364_1995)

    // IEEE 1364-2001
    (Automatic,     "automatic",     V1364_2001)
    (Cell,          "cell",          V1364_2001)
    (Config,        "config",        V1364_2001)
    (Design,        "design",        V1364_2001)
    (Endconfig,     "endconfig",     V1364_2001)
    (Endgenerate,   "endgenerate",   V1364_2001)
    (Generate,      "generate",      V1364_2001)
    (Genvar,        "genvar",        V1364_2001)
    (Incdir,        "incdir",        V1364_2001)
    (Include,       "include",       V1364_2001)
    (Instance,      "instance",      V1364_2001)
    (Liblist,       "liblist",       V1364_2001)
    (Library,       "library",       V1364_2001)
    (Localparam,    "localparam",    V1364_2001)
    (Signed,        "signed",        V1364_2001)
    (Unsigned,      "unsigned",      V1364_2001)
    (Use,           "use",           V1364_2001)

    // IEEE 1364-2005
    (Uwire,         "uwire",         V1364_2005)

    // IEEE 1800-2005
    (Alias,         "alias",         V1800_2005)
    (AlwaysComb,    "always_comb",   V1800_2005)
    (AlwaysFf,      "always_ff",     V1800_2005)
    (AlwaysLatch,   "always_latch",  V1800_2005)
    (Assert,        "assert",        V1800_2005)
    (Assume,        "assume",        V1800_2005)
    (Before,        "before",        V1800_2005)
    (Bind,          "bind",          V1800_2005)
    (Bins,          "bins",          V1800_2005)
    (Binsof,        "binsof",        V1800_2005)
    (Bit,           "bit",           V1800_2005)
    (Break,         "break",         V1800_2005)
    (Byte,          "byte",          V1800_2005)
    (Chandle,       "chandle",       V1800_2005)
    (Class,         "class",         V1800_2005)
    (Clocking,      "clocking",      V1800_2005)
    (Const,         "const",         V1800_2005)
    (Constraint,    "constraint",    V1800_2005)
    (Context,       "context",       V1800_2005)
    (Continue,      "continue",      V1800_2005)
    (Cover,         "cover",         V1800_2005)
    (Covergroup,    "covergroup",    V1800_2005)
    (Coverpoint,    "coverpoint",    V1800_2005)
    (Cross,         "cross",         V1800_2005)
    (Dist,          "dist",          V1800_2005)
    (Do,            "do",            V1800_2005)
    (Endclass,      "endclass",      V1800_2005)
    (Endclocking,   "endclocking",   V1800_2005)
    (Endgroup,      "endgroup",      V1800_2005)
    (Endinterface,  "endinterface",  V1800_2005)
    (Endpackage,    "endpackage",    V1800_2005)
    (Endprogram,    "endprogram",    V1800_2005)
    (Endproperty,   "endproperty",   V1800_2005)
    (Endsequence,   "endsequence",   V1800_2005)
    (Enum,          "enum",          V1800_2005)
    (Expect,        "expect",        V1800_2005)
    (Export,        "export",        V1800_2005)
    (Extends,       "extends",       V1800_2005)
    (Extern,        "extern",        V1800_2005)
    (Final,         "final",         V1800_2005)
    (FirstMatch,    "first_match",   V1800_2005)
    (Foreach,       "foreach",       V1800_2005)
    (Forkjoin,      "forkjoin",      V1800_2005)
    (Iff,           "iff",           V1800_2005)
    (Import,        "import",        V1800_2005)
    (Inside,        "inside",        V1800_2005)
    (Int,           "int",           V1800_2005)
    (Interface,     "interface",     V1800_2005)
    (Intersect,     "intersect",     V1800_2005)
    (JoinAny,       "join_any",      V1800_2005)
    (JoinNone,      "join_none",     V1800_2005)
    (Local,         "local",         V1800_2005)
    (Logic,         "logic",         V1800_2005)
    (Longint,       "longint",       V1800_2005)
    (Matches,       "matches",       V1800_2005)
    (Modport,       "modport",       V1800_2005)
    (New,           "new",           V1800_2005)
    (Null,          "null",          V1800_2005)
    (Package,       "package",       V1800_2005)
    (Packed,        "packed",        V1800_2005)
    (Priority,      "priority",      V1800_2005)
    (Program,       "program",       V1800_2005)
    (Property,      "property",      V1800_2005)
    (Protected,     "protected",     V1800_2005)
    (Pure,          "pure",          V1800_2005)
    (Rand,          "rand",          V1800_2005)
    (Randc,         "randc",         V1800_2005)
    (Randcase,      "randcase",      V1800_2005)
    (Randsequence,  "randsequence",  V1800_2005)
    (Ref,           "ref",           V1800_2005)
    (Return,        "return",        V1800_2005)
    (Sequence,      "sequence",      V1800_2005)
    (Shortint,      "shortint",      V1800_2005)
    (Shortreal,     "shortreal",     V1800_2005)
    (Solve,         "solve",         V1800_2005)
    (Static,        "static",        V1800_2005)
    (String,        "string",        V1800_2005)
    (Struct,        "struct",        V1800_2005)
    (Super,         "super",         V1800_2005)
    (Tagged,        "tagged",        V1800_2005)
    (This,          "this",          V1800_2005)
    (Throughout,    "throughout",    V1800_2005)
    (Timeprecision, "timeprecision", V1800_2005)
    (Timeunit,      "timeunit",      V1800_2005)
    (Type,          "type",          V1800_2005)
    (Typedef,       "typedef",       V1800_2005)
    (Union,         "union",         V1800_2005)
    (Unique,        "unique",        V1800_2005)
    (Var,           "var",           V1800_2005)
    (Virtual,       "virtual",       V1800_2005)
    (Void,          "void",          V1800_2005)
    (WaitOrder,     "wait_order",    V1800_2005)
    (Wildcard,      "wildcard",      V1800_2005)
    (With,          "with",          V1800_2005)
    (Within,        "within",        V1800_2005)

    // IEEE 1800-2009
    (AcceptOn,      "accept_on",     V1800_2009)
    (Checker,       "checker",       V1800_2009)
    (Endchecker,    "endchecker",    V1800_2009)
    (Eventually,    "eventually",    V1800_2009)
    (Global,        "global",        V1800_2009)
    (Implies,       "implies",       V1800_2009)
    (Let,           "let",           V1800_2009)
    (Nexttime,      "nexttime",      V1800_2009)
    (RejectOn,      "reject_on",     V1800_2009)
    (Restrict,      "restrict",      V1800_2009)
    (Strong,        "strong",        V1800_2009)
    (SyncAcceptOn,  "sync_accept_on", V1800_2009)
    (SyncRejectOn,  "sync_reject_on", V1800_2009)
    (Unique0,       "unique0",       V1800_2009)
    (Until,         "until",         V1800_2009)
    (UntilWith,     "until_with",    V1800_2009)
    (Untyped,       "untyped",       V1800_2009)
    (Weak,          "weak",          V1800_2009)

    // IEEE 1800-2012
    (Implements,    "implements",    V1800_2012)
    (Interconnect,  "interconnect",  V1800_2012)
    (Nettype,       "nettype",       V1800_2012)
    (Soft,          "soft",          V1800_2012)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gating() {
        // `logic` is a SystemVerilog keyword, not a Verilog one.
        assert_eq!(
            find_keyword("logic", KeywordVersion::V1800_2017),
            Some(Kw::Logic)
        );
        assert_eq!(find_keyword("logic", KeywordVersion::V1364_2005), None);
        // `generate` arrived with 1364-2001.
        assert_eq!(find_keyword("generate", KeywordVersion::V1364_1995), None);
        assert_eq!(
            find_keyword("generate", KeywordVersion::V1364_2001),
            Some(Kw::Generate)
        );
        assert_eq!(find_keyword("not_a_keyword", KeywordVersion::V1800_2017), None);
    }

    #[test]
    fn version_strings() {
        assert_eq!(
            KeywordVersion::from_version_token("1800-2012"),
            Some(KeywordVersion::V1800_2012)
        );
        assert_eq!(KeywordVersion::from_version_token("1800-2031"), None);
    }

    #[test]
    fn spelling_round_trip() {
        assert_eq!(Kw::AlwaysFf.as_str(), "always_ff");
        assert_eq!(
            find_keyword(Kw::Endmodule.as_str(), KeywordVersion::V1364_1995),
            Some(Kw::Endmodule)
        );
    }
}
