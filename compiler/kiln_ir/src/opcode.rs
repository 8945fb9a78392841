//! Instruction opcodes and comparison predicates.

use std::fmt;

/// Instruction opcode.
///
/// Also used for constant expressions, which share the instruction
/// vocabulary (`ConstantKind::Expr(Opcode::Add)` is a folded-later `add`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // Terminators
    Ret,
    Br,
    Switch,
    Invoke,
    Unreachable,

    // Binary operators
    Add,
    FAdd,
    Sub,
    FSub,
    Mul,
    FMul,
    UDiv,
    SDiv,
    FDiv,
    URem,
    SRem,
    FRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,

    // Unary operators
    FNeg,

    // Memory
    Alloca,
    Load,
    Store,
    GetElementPtr,

    // Casts
    Trunc,
    ZExt,
    SExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    FPTrunc,
    FPExt,
    PtrToInt,
    IntToPtr,
    BitCast,

    // Other
    ICmp,
    FCmp,
    Phi,
    Call,
    Select,
    VAArg,
    ExtractElement,
    InsertElement,
    ShuffleVector,
    ExtractValue,
    InsertValue,
}

impl Opcode {
    /// Every opcode, in declaration order.
    pub const ALL: [Opcode; 51] = [
        Opcode::Ret,
        Opcode::Br,
        Opcode::Switch,
        Opcode::Invoke,
        Opcode::Unreachable,
        Opcode::Add,
        Opcode::FAdd,
        Opcode::Sub,
        Opcode::FSub,
        Opcode::Mul,
        Opcode::FMul,
        Opcode::UDiv,
        Opcode::SDiv,
        Opcode::FDiv,
        Opcode::URem,
        Opcode::SRem,
        Opcode::FRem,
        Opcode::Shl,
        Opcode::LShr,
        Opcode::AShr,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::FNeg,
        Opcode::Alloca,
        Opcode::Load,
        Opcode::Store,
        Opcode::GetElementPtr,
        Opcode::Trunc,
        Opcode::ZExt,
        Opcode::SExt,
        Opcode::FPToUI,
        Opcode::FPToSI,
        Opcode::UIToFP,
        Opcode::SIToFP,
        Opcode::FPTrunc,
        Opcode::FPExt,
        Opcode::PtrToInt,
        Opcode::IntToPtr,
        Opcode::BitCast,
        Opcode::ICmp,
        Opcode::FCmp,
        Opcode::Phi,
        Opcode::Call,
        Opcode::Select,
        Opcode::VAArg,
        Opcode::ExtractElement,
        Opcode::InsertElement,
        Opcode::ShuffleVector,
        Opcode::ExtractValue,
        Opcode::InsertValue,
    ];

    /// Instructions that end a basic block.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Ret | Opcode::Br | Opcode::Switch | Opcode::Invoke | Opcode::Unreachable
        )
    }

    /// Two-operand arithmetic and bitwise operators.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::FAdd
                | Opcode::Sub
                | Opcode::FSub
                | Opcode::Mul
                | Opcode::FMul
                | Opcode::UDiv
                | Opcode::SDiv
                | Opcode::FDiv
                | Opcode::URem
                | Opcode::SRem
                | Opcode::FRem
                | Opcode::Shl
                | Opcode::LShr
                | Opcode::AShr
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
        )
    }

    /// Binary operators over floating-point operands.
    pub fn is_float_binary(self) -> bool {
        matches!(
            self,
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv | Opcode::FRem
        )
    }

    /// `a op b == b op a`.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::FAdd
                | Opcode::Mul
                | Opcode::FMul
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
        )
    }

    /// Integer division and remainder, which trap on a zero divisor.
    pub fn is_division(self) -> bool {
        matches!(
            self,
            Opcode::UDiv | Opcode::SDiv | Opcode::URem | Opcode::SRem
        )
    }

    /// Conversion operators.
    pub fn is_cast(self) -> bool {
        matches!(
            self,
            Opcode::Trunc
                | Opcode::ZExt
                | Opcode::SExt
                | Opcode::FPToUI
                | Opcode::FPToSI
                | Opcode::UIToFP
                | Opcode::SIToFP
                | Opcode::FPTrunc
                | Opcode::FPExt
                | Opcode::PtrToInt
                | Opcode::IntToPtr
                | Opcode::BitCast
        )
    }

    /// Whether executing the instruction can be observed beyond its result.
    ///
    /// Instructions without side effects and without uses are dead.
    pub fn has_side_effects(self) -> bool {
        self.is_terminator()
            || matches!(self, Opcode::Store | Opcode::Call | Opcode::VAArg)
    }

    /// Whether the instruction may trap even though it has no side effects.
    pub fn may_trap(self) -> bool {
        self.is_division() || matches!(self, Opcode::Load)
    }

    /// The textual mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Ret => "ret",
            Opcode::Br => "br",
            Opcode::Switch => "switch",
            Opcode::Invoke => "invoke",
            Opcode::Unreachable => "unreachable",
            Opcode::Add => "add",
            Opcode::FAdd => "fadd",
            Opcode::Sub => "sub",
            Opcode::FSub => "fsub",
            Opcode::Mul => "mul",
            Opcode::FMul => "fmul",
            Opcode::UDiv => "udiv",
            Opcode::SDiv => "sdiv",
            Opcode::FDiv => "fdiv",
            Opcode::URem => "urem",
            Opcode::SRem => "srem",
            Opcode::FRem => "frem",
            Opcode::Shl => "shl",
            Opcode::LShr => "lshr",
            Opcode::AShr => "ashr",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::FNeg => "fneg",
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::GetElementPtr => "getelementptr",
            Opcode::Trunc => "trunc",
            Opcode::ZExt => "zext",
            Opcode::SExt => "sext",
            Opcode::FPToUI => "fptoui",
            Opcode::FPToSI => "fptosi",
            Opcode::UIToFP => "uitofp",
            Opcode::SIToFP => "sitofp",
            Opcode::FPTrunc => "fptrunc",
            Opcode::FPExt => "fpext",
            Opcode::PtrToInt => "ptrtoint",
            Opcode::IntToPtr => "inttoptr",
            Opcode::BitCast => "bitcast",
            Opcode::ICmp => "icmp",
            Opcode::FCmp => "fcmp",
            Opcode::Phi => "phi",
            Opcode::Call => "call",
            Opcode::Select => "select",
            Opcode::VAArg => "va_arg",
            Opcode::ExtractElement => "extractelement",
            Opcode::InsertElement => "insertelement",
            Opcode::ShuffleVector => "shufflevector",
            Opcode::ExtractValue => "extractvalue",
            Opcode::InsertValue => "insertvalue",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Predicates ──────────────────────────────────────────────────────

/// Integer comparison predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    pub fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntPredicate::Sgt | IntPredicate::Sge | IntPredicate::Slt | IntPredicate::Sle
        )
    }

    /// The predicate that holds for `(b, a)` whenever `self` holds for `(a, b)`.
    pub fn swapped(self) -> Self {
        match self {
            IntPredicate::Eq => IntPredicate::Eq,
            IntPredicate::Ne => IntPredicate::Ne,
            IntPredicate::Ugt => IntPredicate::Ult,
            IntPredicate::Uge => IntPredicate::Ule,
            IntPredicate::Ult => IntPredicate::Ugt,
            IntPredicate::Ule => IntPredicate::Uge,
            IntPredicate::Sgt => IntPredicate::Slt,
            IntPredicate::Sge => IntPredicate::Sle,
            IntPredicate::Slt => IntPredicate::Sgt,
            IntPredicate::Sle => IntPredicate::Sge,
        }
    }
}

/// Floating-point comparison predicate.
///
/// `O*` predicates are false when either operand is NaN, `U*` predicates
/// are true.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    False,
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Uno,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    True,
}

impl FloatPredicate {
    pub fn name(self) -> &'static str {
        match self {
            FloatPredicate::False => "false",
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::One => "one",
            FloatPredicate::Ord => "ord",
            FloatPredicate::Uno => "uno",
            FloatPredicate::Ueq => "ueq",
            FloatPredicate::Ugt => "ugt",
            FloatPredicate::Uge => "uge",
            FloatPredicate::Ult => "ult",
            FloatPredicate::Ule => "ule",
            FloatPredicate::Une => "une",
            FloatPredicate::True => "true",
        }
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for FloatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
