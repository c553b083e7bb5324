//! セマンティック検査スタックのルートモジュール。
//!
//! `realize_decl` と `check_decl` を入口に、名前解決・型実体化・制約
//! 生成・求解・準拠検査を 1 つの `Checker` 値の上で組み合わせる。

pub mod capture;
pub mod conformance;
pub mod constraint;
mod driver;
pub mod env;
mod fold;
mod generate;
mod metrics;
mod realize;
pub mod relations;
mod resolve;
mod solve;
pub mod types;

pub use capture::CaptureRecord;
pub use conformance::SynthesizedDecl;
pub use constraint::{
    Constraint, ConstraintBranch, ConstraintKind, ConstraintOrigin, InferenceFacts, OriginKind,
    OverloadCandidate,
};
pub use driver::{CheckResult, Checker, DeclState};
pub use env::{
    CheckerConfig, CheckerConfigBuilder, EnvConstraint, EnvConstraintKind, GenericEnvironment,
};
pub use fold::FoldedSequence;
pub use generate::{DeferredQuery, Problem};
pub use metrics::CheckerMetrics;
pub use relations::{
    Conformance, Implementation, RegistrationError, Relations, SharedRelations, SynthesizedKind,
    VisibilityContext,
};
pub use resolve::{Candidate, CandidateSet, DeclReference, NamePurpose, NameResolution};
pub use solve::{Solution, SolutionScore};
pub use types::{
    BuiltinType, CallableParam, CompileTimeValue, ExistentialConstraint, ExistentialInterface,
    GenericArgument, GenericArgumentMap, TupleElement, TypeDisplay, TypeFlags, TypeId, TypeNode,
    TypeStore, TypeTransform, VarId,
};
