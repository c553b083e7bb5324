//! 型の宇宙。全型はハッシュコンシングで intern され、ハンドル
//! (`TypeId`) の等値が構造的等値に一致する。フラグは構築時に伝播する。

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::fmt;

use crate::ast::{AccessEffect, DeclId, Program};

/// intern された型のハンドル。等値比較は O(1)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

impl TypeId {
    /// エラー型。`TypeStore::new` が最初に intern する。
    pub const ERROR: TypeId = TypeId(0);
    /// 空タプルと同一視されるユニット型。
    pub const VOID: TypeId = TypeId(1);
    /// ボトム型。
    pub const NEVER: TypeId = TypeId(2);
    /// トップ型。
    pub const ANY: TypeId = TypeId(3);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t#{}", self.0)
    }
}

/// 推論変数の識別子。下位 8 ビットが文脈タグ、上位 56 ビットが連番。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(pub u64);

impl VarId {
    pub fn new(ordinal: u64, context: u8) -> Self {
        debug_assert!(ordinal < (1 << 56));
        Self((ordinal << 8) | context as u64)
    }

    pub fn ordinal(self) -> u64 {
        self.0 >> 8
    }

    pub fn context(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.ordinal())
    }
}

/// 組み込み型の種別。`Builtin` モジュール配下でのみ名前解決される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinType {
    /// 組み込みモジュールそのものを指す番兵。
    Module,
    Ptr,
    I1,
    I64,
    Float64,
}

impl BuiltinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinType::Module => "Builtin",
            BuiltinType::Ptr => "Builtin.ptr",
            BuiltinType::I1 => "Builtin.i1",
            BuiltinType::I64 => "Builtin.i64",
            BuiltinType::Float64 => "Builtin.float64",
        }
    }

    /// 名前から組み込み型を引く。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ptr" => Some(BuiltinType::Ptr),
            "i1" => Some(BuiltinType::I1),
            "i64" => Some(BuiltinType::I64),
            "float64" => Some(BuiltinType::Float64),
            _ => None,
        }
    }
}

/// コンパイル時値。値総称引数の評価は記号的には行わず、構造比較のみ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompileTimeValue {
    Int { value: i64 },
    Bool { value: bool },
    /// 値総称パラメータへの参照。
    Param { decl: DeclId },
}

/// 総称引数。型かコンパイル時値のいずれか。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenericArgument {
    Type { ty: TypeId },
    Value { value: CompileTimeValue },
}

/// パラメータ宣言 → 総称引数の順序付き写像。
pub type GenericArgumentMap = indexmap::IndexMap<DeclId, GenericArgument>;

/// タプル要素。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TupleElement {
    pub label: Option<SmolStr>,
    pub ty: TypeId,
}

/// 呼び出し可能型の入力。`ty` は通常 `Parameter` ノード。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallableParam {
    pub label: Option<SmolStr>,
    pub ty: TypeId,
}

/// 存在型のインタフェース部。ビュー集合か単一の総称型。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExistentialInterface {
    Views { views: Vec<TypeId> },
    Generic { ty: TypeId },
}

/// 型の構造。閉集合であり、網羅 match を前提にする。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeNode {
    Error,
    Void,
    Never,
    Any,
    Builtin {
        builtin: BuiltinType,
    },
    Record {
        decl: DeclId,
    },
    View {
        decl: DeclId,
    },
    /// エイリアス。`aliasee` は展開先。正準形ではない。
    Alias {
        decl: DeclId,
        aliasee: TypeId,
    },
    Module {
        decl: DeclId,
    },
    Namespace {
        decl: DeclId,
    },
    GenericParam {
        decl: DeclId,
    },
    AssocType {
        decl: DeclId,
        domain: TypeId,
    },
    AssocValue {
        decl: DeclId,
        domain: TypeId,
    },
    /// 導入スコープ内で固定された総称パラメータ。
    Skolem {
        base: TypeId,
    },
    Var {
        id: VarId,
    },
    /// 基底型と総称引数の束縛。引数は DeclId 順に正規化して保持する。
    BoundGeneric {
        base: TypeId,
        arguments: Vec<(DeclId, GenericArgument)>,
    },
    Metatype {
        instance: TypeId,
    },
    Lambda {
        receiver_effect: AccessEffect,
        environment: TypeId,
        inputs: Vec<CallableParam>,
        output: TypeId,
    },
    /// メソッドバンドル。変種は効果順に正規化して保持する。
    Bundle {
        receiver: TypeId,
        variants: Vec<(AccessEffect, TypeId)>,
    },
    Subscript {
        is_property: bool,
        capabilities: Vec<AccessEffect>,
        environment: TypeId,
        inputs: Vec<CallableParam>,
        output: TypeId,
    },
    Parameter {
        convention: AccessEffect,
        bare: TypeId,
    },
    Remote {
        effect: AccessEffect,
        target: TypeId,
    },
    Tuple {
        elements: Vec<TupleElement>,
    },
    /// 直和型。要素は TypeId 順に正規化して保持する。
    Sum {
        variants: Vec<TypeId>,
    },
    Existential {
        interface: ExistentialInterface,
        constraints: Vec<ExistentialConstraint>,
    },
    /// 特定ビューを通して見た主体。
    Lens {
        subject: TypeId,
        view: TypeId,
    },
}

/// 存在型に付随する `where` 制約。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExistentialConstraint {
    Conformance { subject: TypeId, views: Vec<TypeId> },
    Equality { lhs: TypeId, rhs: TypeId },
}

/// 構築時に伝播するフラグ集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeFlags(u8);

impl TypeFlags {
    pub const HAS_VARIABLE: TypeFlags = TypeFlags(1 << 0);
    pub const HAS_ERROR: TypeFlags = TypeFlags(1 << 1);
    pub const HAS_GENERIC_TYPE_PARAM: TypeFlags = TypeFlags(1 << 2);
    pub const HAS_GENERIC_VALUE_PARAM: TypeFlags = TypeFlags(1 << 3);
    const IS_CANONICAL_BIT: u8 = 1 << 4;

    /// 正準かつ他フラグなしの基底値。
    pub fn canonical_base() -> TypeFlags {
        TypeFlags(Self::IS_CANONICAL_BIT)
    }

    pub fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_variable(self) -> bool {
        self.contains(Self::HAS_VARIABLE)
    }

    pub fn has_error(self) -> bool {
        self.contains(Self::HAS_ERROR)
    }

    pub fn has_generic_type_param(self) -> bool {
        self.contains(Self::HAS_GENERIC_TYPE_PARAM)
    }

    pub fn has_generic_value_param(self) -> bool {
        self.contains(Self::HAS_GENERIC_VALUE_PARAM)
    }

    pub fn is_canonical(self) -> bool {
        self.0 & Self::IS_CANONICAL_BIT != 0
    }

    /// 子のフラグを親へ畳み込む。HAS_* は和、正準性は積で伝播する。
    pub fn merge_child(self, child: TypeFlags) -> TypeFlags {
        let has = (self.0 | child.0) & !Self::IS_CANONICAL_BIT;
        let canonical = self.0 & child.0 & Self::IS_CANONICAL_BIT;
        TypeFlags(has | canonical)
    }

    fn with(self, flag: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | flag.0)
    }

    fn without_canonical(self) -> TypeFlags {
        TypeFlags(self.0 & !Self::IS_CANONICAL_BIT)
    }
}

/// `transform` のステップ指示。
pub enum TypeTransform {
    /// この部分型を置き換えて打ち切る。
    Replace(TypeId),
    /// 子へ再帰して再構築する。
    Recurse,
}

/// 型の intern テーブル。
#[derive(Debug, Clone, Default)]
pub struct TypeStore {
    nodes: IndexSet<TypeNode>,
    flags: Vec<TypeFlags>,
    next_var: u64,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            nodes: IndexSet::new(),
            flags: Vec::new(),
            next_var: 0,
        };
        // TypeId の定数は intern 順に依存する。順序を変えてはならない。
        let error = store.intern(TypeNode::Error);
        let void = store.intern(TypeNode::Void);
        let never = store.intern(TypeNode::Never);
        let any = store.intern(TypeNode::Any);
        debug_assert_eq!(error, TypeId::ERROR);
        debug_assert_eq!(void, TypeId::VOID);
        debug_assert_eq!(never, TypeId::NEVER);
        debug_assert_eq!(any, TypeId::ANY);
        store
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        self.nodes
            .get_index(id.index())
            .expect("未登録の TypeId")
    }

    pub fn flags(&self, id: TypeId) -> TypeFlags {
        self.flags[id.index()]
    }

    /// ノードを intern して ID を返す。既存なら同じ ID。
    pub fn intern(&mut self, node: TypeNode) -> TypeId {
        if let Some(index) = self.nodes.get_index_of(&node) {
            return TypeId(index as u32);
        }
        let flags = self.compute_flags(&node);
        let (index, inserted) = self.nodes.insert_full(node);
        debug_assert!(inserted);
        self.flags.push(flags);
        TypeId(index as u32)
    }

    fn compute_flags(&self, node: &TypeNode) -> TypeFlags {
        let mut flags = match node {
            TypeNode::Error => TypeFlags::canonical_base().with(TypeFlags::HAS_ERROR),
            TypeNode::Var { .. } => TypeFlags::canonical_base().with(TypeFlags::HAS_VARIABLE),
            TypeNode::GenericParam { .. } => {
                TypeFlags::canonical_base().with(TypeFlags::HAS_GENERIC_TYPE_PARAM)
            }
            TypeNode::Alias { .. } => TypeFlags::canonical_base().without_canonical(),
            _ => TypeFlags::canonical_base(),
        };
        if let TypeNode::BoundGeneric { arguments, .. } = node {
            if arguments.iter().any(|(_, argument)| {
                matches!(
                    argument,
                    GenericArgument::Value {
                        value: CompileTimeValue::Param { .. }
                    }
                )
            }) {
                flags = flags.with(TypeFlags::HAS_GENERIC_VALUE_PARAM);
            }
        }
        for child in Self::node_children(node) {
            flags = flags.merge_child(self.flags(child));
        }
        flags
    }

    fn node_children(node: &TypeNode) -> SmallVec<[TypeId; 8]> {
        let mut out = SmallVec::new();
        match node {
            TypeNode::Error
            | TypeNode::Void
            | TypeNode::Never
            | TypeNode::Any
            | TypeNode::Builtin { .. }
            | TypeNode::Record { .. }
            | TypeNode::View { .. }
            | TypeNode::Module { .. }
            | TypeNode::Namespace { .. }
            | TypeNode::GenericParam { .. }
            | TypeNode::Var { .. } => {}
            TypeNode::Alias { aliasee, .. } => out.push(*aliasee),
            TypeNode::AssocType { domain, .. } | TypeNode::AssocValue { domain, .. } => {
                out.push(*domain)
            }
            TypeNode::Skolem { base } => out.push(*base),
            TypeNode::BoundGeneric { base, arguments } => {
                out.push(*base);
                for (_, argument) in arguments {
                    if let GenericArgument::Type { ty } = argument {
                        out.push(*ty);
                    }
                }
            }
            TypeNode::Metatype { instance } => out.push(*instance),
            TypeNode::Lambda {
                environment,
                inputs,
                output,
                ..
            } => {
                out.push(*environment);
                out.extend(inputs.iter().map(|input| input.ty));
                out.push(*output);
            }
            TypeNode::Bundle { receiver, variants } => {
                out.push(*receiver);
                out.extend(variants.iter().map(|(_, ty)| *ty));
            }
            TypeNode::Subscript {
                environment,
                inputs,
                output,
                ..
            } => {
                out.push(*environment);
                out.extend(inputs.iter().map(|input| input.ty));
                out.push(*output);
            }
            TypeNode::Parameter { bare, .. } => out.push(*bare),
            TypeNode::Remote { target, .. } => out.push(*target),
            TypeNode::Tuple { elements } => {
                out.extend(elements.iter().map(|element| element.ty))
            }
            TypeNode::Sum { variants } => out.extend(variants.iter().copied()),
            TypeNode::Existential {
                interface,
                constraints,
            } => {
                match interface {
                    ExistentialInterface::Views { views } => out.extend(views.iter().copied()),
                    ExistentialInterface::Generic { ty } => out.push(*ty),
                }
                for constraint in constraints {
                    match constraint {
                        ExistentialConstraint::Conformance { subject, views } => {
                            out.push(*subject);
                            out.extend(views.iter().copied());
                        }
                        ExistentialConstraint::Equality { lhs, rhs } => {
                            out.push(*lhs);
                            out.push(*rhs);
                        }
                    }
                }
            }
            TypeNode::Lens { subject, view } => {
                out.push(*subject);
                out.push(*view);
            }
        }
        out
    }

    /// 直下の子型を列挙する。
    pub fn children(&self, id: TypeId) -> SmallVec<[TypeId; 8]> {
        Self::node_children(self.node(id))
    }

    // ---- コンストラクタ ----

    pub fn fresh_var(&mut self, context: u8) -> TypeId {
        let id = VarId::new(self.next_var, context);
        self.next_var += 1;
        self.intern(TypeNode::Var { id })
    }

    pub fn builtin(&mut self, builtin: BuiltinType) -> TypeId {
        self.intern(TypeNode::Builtin { builtin })
    }

    pub fn record(&mut self, decl: DeclId) -> TypeId {
        self.intern(TypeNode::Record { decl })
    }

    pub fn view(&mut self, decl: DeclId) -> TypeId {
        self.intern(TypeNode::View { decl })
    }

    pub fn alias(&mut self, decl: DeclId, aliasee: TypeId) -> TypeId {
        self.intern(TypeNode::Alias { decl, aliasee })
    }

    pub fn module(&mut self, decl: DeclId) -> TypeId {
        self.intern(TypeNode::Module { decl })
    }

    pub fn namespace(&mut self, decl: DeclId) -> TypeId {
        self.intern(TypeNode::Namespace { decl })
    }

    pub fn generic_param(&mut self, decl: DeclId) -> TypeId {
        self.intern(TypeNode::GenericParam { decl })
    }

    pub fn assoc_type(&mut self, decl: DeclId, domain: TypeId) -> TypeId {
        self.intern(TypeNode::AssocType { decl, domain })
    }

    pub fn assoc_value(&mut self, decl: DeclId, domain: TypeId) -> TypeId {
        self.intern(TypeNode::AssocValue { decl, domain })
    }

    pub fn skolem(&mut self, base: TypeId) -> TypeId {
        self.intern(TypeNode::Skolem { base })
    }

    /// 総称引数束縛。引数は DeclId 順に正規化する。
    pub fn bound_generic(
        &mut self,
        base: TypeId,
        mut arguments: Vec<(DeclId, GenericArgument)>,
    ) -> TypeId {
        arguments.sort_by_key(|(decl, _)| *decl);
        self.intern(TypeNode::BoundGeneric { base, arguments })
    }

    pub fn metatype(&mut self, instance: TypeId) -> TypeId {
        self.intern(TypeNode::Metatype { instance })
    }

    pub fn lambda(
        &mut self,
        receiver_effect: AccessEffect,
        environment: TypeId,
        inputs: Vec<CallableParam>,
        output: TypeId,
    ) -> TypeId {
        self.intern(TypeNode::Lambda {
            receiver_effect,
            environment,
            inputs,
            output,
        })
    }

    /// メソッドバンドル型。変種リストは空であってはならない。
    pub fn bundle(
        &mut self,
        receiver: TypeId,
        mut variants: Vec<(AccessEffect, TypeId)>,
    ) -> TypeId {
        debug_assert!(!variants.is_empty());
        variants.sort_by_key(|(effect, _)| *effect);
        self.intern(TypeNode::Bundle { receiver, variants })
    }

    pub fn subscript(
        &mut self,
        is_property: bool,
        mut capabilities: Vec<AccessEffect>,
        environment: TypeId,
        inputs: Vec<CallableParam>,
        output: TypeId,
    ) -> TypeId {
        capabilities.sort();
        capabilities.dedup();
        self.intern(TypeNode::Subscript {
            is_property,
            capabilities,
            environment,
            inputs,
            output,
        })
    }

    pub fn parameter(&mut self, convention: AccessEffect, bare: TypeId) -> TypeId {
        self.intern(TypeNode::Parameter { convention, bare })
    }

    pub fn remote(&mut self, effect: AccessEffect, target: TypeId) -> TypeId {
        self.intern(TypeNode::Remote { effect, target })
    }

    pub fn tuple(&mut self, elements: Vec<TupleElement>) -> TypeId {
        if elements.is_empty() {
            return TypeId::VOID;
        }
        self.intern(TypeNode::Tuple { elements })
    }

    /// 直和型。要素を正規化し、1 要素に潰れた場合はその要素を返す。
    pub fn sum(&mut self, mut variants: Vec<TypeId>) -> TypeId {
        variants.sort();
        variants.dedup();
        match variants.len() {
            0 => TypeId::NEVER,
            1 => variants[0],
            _ => self.intern(TypeNode::Sum { variants }),
        }
    }

    pub fn existential(
        &mut self,
        interface: ExistentialInterface,
        constraints: Vec<ExistentialConstraint>,
    ) -> TypeId {
        let interface = match interface {
            ExistentialInterface::Views { mut views } => {
                views.sort();
                views.dedup();
                ExistentialInterface::Views { views }
            }
            other => other,
        };
        self.intern(TypeNode::Existential {
            interface,
            constraints,
        })
    }

    pub fn lens(&mut self, subject: TypeId, view: TypeId) -> TypeId {
        self.intern(TypeNode::Lens { subject, view })
    }

    // ---- 変形 ----

    /// 型を上から下へ変形する。`f` が `Replace` を返した部分木は
    /// それ以上辿らない。構造が変わらなければ同じ ID を返す。
    pub fn transform(
        &mut self,
        id: TypeId,
        f: &mut impl FnMut(&mut TypeStore, TypeId) -> TypeTransform,
    ) -> TypeId {
        match f(self, id) {
            TypeTransform::Replace(replacement) => replacement,
            TypeTransform::Recurse => self.transform_children(id, f),
        }
    }

    fn transform_children(
        &mut self,
        id: TypeId,
        f: &mut impl FnMut(&mut TypeStore, TypeId) -> TypeTransform,
    ) -> TypeId {
        let node = self.node(id).clone();
        let rebuilt = match node {
            TypeNode::Error
            | TypeNode::Void
            | TypeNode::Never
            | TypeNode::Any
            | TypeNode::Builtin { .. }
            | TypeNode::Record { .. }
            | TypeNode::View { .. }
            | TypeNode::Module { .. }
            | TypeNode::Namespace { .. }
            | TypeNode::GenericParam { .. }
            | TypeNode::Var { .. } => return id,
            TypeNode::Alias { decl, aliasee } => TypeNode::Alias {
                decl,
                aliasee: self.transform(aliasee, f),
            },
            TypeNode::AssocType { decl, domain } => TypeNode::AssocType {
                decl,
                domain: self.transform(domain, f),
            },
            TypeNode::AssocValue { decl, domain } => TypeNode::AssocValue {
                decl,
                domain: self.transform(domain, f),
            },
            TypeNode::Skolem { base } => TypeNode::Skolem {
                base: self.transform(base, f),
            },
            TypeNode::BoundGeneric { base, arguments } => {
                let base = self.transform(base, f);
                let arguments = arguments
                    .into_iter()
                    .map(|(decl, argument)| {
                        let argument = match argument {
                            GenericArgument::Type { ty } => GenericArgument::Type {
                                ty: self.transform(ty, f),
                            },
                            value => value,
                        };
                        (decl, argument)
                    })
                    .collect();
                TypeNode::BoundGeneric { base, arguments }
            }
            TypeNode::Metatype { instance } => TypeNode::Metatype {
                instance: self.transform(instance, f),
            },
            TypeNode::Lambda {
                receiver_effect,
                environment,
                inputs,
                output,
            } => TypeNode::Lambda {
                receiver_effect,
                environment: self.transform(environment, f),
                inputs: self.transform_params(inputs, f),
                output: self.transform(output, f),
            },
            TypeNode::Bundle { receiver, variants } => TypeNode::Bundle {
                receiver: self.transform(receiver, f),
                variants: variants
                    .into_iter()
                    .map(|(effect, ty)| (effect, self.transform(ty, f)))
                    .collect(),
            },
            TypeNode::Subscript {
                is_property,
                capabilities,
                environment,
                inputs,
                output,
            } => TypeNode::Subscript {
                is_property,
                capabilities,
                environment: self.transform(environment, f),
                inputs: self.transform_params(inputs, f),
                output: self.transform(output, f),
            },
            TypeNode::Parameter { convention, bare } => TypeNode::Parameter {
                convention,
                bare: self.transform(bare, f),
            },
            TypeNode::Remote { effect, target } => TypeNode::Remote {
                effect,
                target: self.transform(target, f),
            },
            TypeNode::Tuple { elements } => TypeNode::Tuple {
                elements: elements
                    .into_iter()
                    .map(|element| TupleElement {
                        label: element.label,
                        ty: self.transform(element.ty, f),
                    })
                    .collect(),
            },
            TypeNode::Sum { variants } => {
                let variants = variants
                    .into_iter()
                    .map(|variant| self.transform(variant, f))
                    .collect();
                return self.sum(variants);
            }
            TypeNode::Existential {
                interface,
                constraints,
            } => {
                let interface = match interface {
                    ExistentialInterface::Views { views } => ExistentialInterface::Views {
                        views: views.into_iter().map(|view| self.transform(view, f)).collect(),
                    },
                    ExistentialInterface::Generic { ty } => ExistentialInterface::Generic {
                        ty: self.transform(ty, f),
                    },
                };
                let constraints = constraints
                    .into_iter()
                    .map(|constraint| match constraint {
                        ExistentialConstraint::Conformance { subject, views } => {
                            ExistentialConstraint::Conformance {
                                subject: self.transform(subject, f),
                                views: views
                                    .into_iter()
                                    .map(|view| self.transform(view, f))
                                    .collect(),
                            }
                        }
                        ExistentialConstraint::Equality { lhs, rhs } => {
                            ExistentialConstraint::Equality {
                                lhs: self.transform(lhs, f),
                                rhs: self.transform(rhs, f),
                            }
                        }
                    })
                    .collect();
                TypeNode::Existential {
                    interface,
                    constraints,
                }
            }
            TypeNode::Lens { subject, view } => TypeNode::Lens {
                subject: self.transform(subject, f),
                view: self.transform(view, f),
            },
        };
        self.intern(rebuilt)
    }

    fn transform_params(
        &mut self,
        inputs: Vec<CallableParam>,
        f: &mut impl FnMut(&mut TypeStore, TypeId) -> TypeTransform,
    ) -> Vec<CallableParam> {
        inputs
            .into_iter()
            .map(|input| CallableParam {
                label: input.label,
                ty: self.transform(input.ty, f),
            })
            .collect()
    }

    /// 総称パラメータを引数で置き換える。値パラメータ参照も置換する。
    pub fn specialize(
        &mut self,
        id: TypeId,
        arguments: &indexmap::IndexMap<DeclId, GenericArgument>,
    ) -> TypeId {
        if arguments.is_empty() {
            return id;
        }
        self.transform(id, &mut |store, current| match store.node(current) {
            TypeNode::GenericParam { decl } => match arguments.get(decl) {
                Some(GenericArgument::Type { ty }) => TypeTransform::Replace(*ty),
                _ => TypeTransform::Replace(current),
            },
            // 固定されたパラメータも引数があれば剥がして置き換える。
            TypeNode::Skolem { base } => {
                let base = *base;
                if let TypeNode::GenericParam { decl } = store.node(base) {
                    if let Some(GenericArgument::Type { ty }) = arguments.get(decl) {
                        return TypeTransform::Replace(*ty);
                    }
                }
                TypeTransform::Recurse
            }
            TypeNode::BoundGeneric { .. } => {
                let TypeNode::BoundGeneric {
                    base,
                    arguments: bound,
                } = store.node(current).clone()
                else {
                    unreachable!()
                };
                let base = store.specialize(base, arguments);
                let bound = bound
                    .into_iter()
                    .map(|(decl, argument)| {
                        let argument = match argument {
                            GenericArgument::Type { ty } => GenericArgument::Type {
                                ty: store.specialize(ty, arguments),
                            },
                            GenericArgument::Value {
                                value: CompileTimeValue::Param { decl: param },
                            } => match arguments.get(&param) {
                                Some(GenericArgument::Value { value }) => {
                                    GenericArgument::Value { value: *value }
                                }
                                _ => GenericArgument::Value {
                                    value: CompileTimeValue::Param { decl: param },
                                },
                            },
                            value => value,
                        };
                        (decl, argument)
                    })
                    .collect();
                TypeTransform::Replace(store.bound_generic(base, bound))
            }
            _ => TypeTransform::Recurse,
        })
    }

    /// 変数への代入を適用する。
    pub fn substitute(
        &mut self,
        id: TypeId,
        mapping: &indexmap::IndexMap<VarId, TypeId>,
    ) -> TypeId {
        if mapping.is_empty() || !self.flags(id).has_variable() {
            return id;
        }
        self.transform(id, &mut |store, current| match store.node(current) {
            TypeNode::Var { id: var } => match mapping.get(var) {
                // 代入先にさらに変数が含まれることがあるため再帰適用する。
                Some(replacement) => {
                    TypeTransform::Replace(store.substitute(*replacement, mapping))
                }
                None => TypeTransform::Replace(current),
            },
            _ => {
                if store.flags(current).has_variable() {
                    TypeTransform::Recurse
                } else {
                    TypeTransform::Replace(current)
                }
            }
        })
    }

    /// パラメータ規約を剥がして裸の型を返す。
    pub fn strip_parameter(&self, id: TypeId) -> TypeId {
        match self.node(id) {
            TypeNode::Parameter { bare, .. } => *bare,
            _ => id,
        }
    }

    /// 人間向け表示を組み立てる。
    pub fn display<'a>(&'a self, program: &'a Program, id: TypeId) -> TypeDisplay<'a> {
        TypeDisplay {
            store: self,
            program,
            id,
        }
    }
}

/// `fmt::Display` 用のアダプタ。
pub struct TypeDisplay<'a> {
    store: &'a TypeStore,
    program: &'a Program,
    id: TypeId,
}

impl<'a> TypeDisplay<'a> {
    fn child(&self, id: TypeId) -> TypeDisplay<'a> {
        TypeDisplay {
            store: self.store,
            program: self.program,
            id,
        }
    }

    fn decl_name(&self, decl: DeclId) -> SmolStr {
        self.program
            .decl_name(decl)
            .map(|name| name.stem)
            .unwrap_or_else(|| SmolStr::new("<anonymous>"))
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store.node(self.id) {
            TypeNode::Error => write!(f, "<error>"),
            TypeNode::Void => write!(f, "Void"),
            TypeNode::Never => write!(f, "Never"),
            TypeNode::Any => write!(f, "Any"),
            TypeNode::Builtin { builtin } => write!(f, "{}", builtin.as_str()),
            TypeNode::Record { decl }
            | TypeNode::View { decl }
            | TypeNode::Module { decl }
            | TypeNode::Namespace { decl }
            | TypeNode::GenericParam { decl } => write!(f, "{}", self.decl_name(*decl)),
            TypeNode::Alias { decl, .. } => write!(f, "{}", self.decl_name(*decl)),
            TypeNode::AssocType { decl, domain } | TypeNode::AssocValue { decl, domain } => {
                write!(f, "{}.{}", self.child(*domain), self.decl_name(*decl))
            }
            TypeNode::Skolem { base } => write!(f, "${}", self.child(*base)),
            TypeNode::Var { id } => write!(f, "{id}"),
            TypeNode::BoundGeneric { base, arguments } => {
                write!(f, "{}<", self.child(*base))?;
                for (idx, (_, argument)) in arguments.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    match argument {
                        GenericArgument::Type { ty } => write!(f, "{}", self.child(*ty))?,
                        GenericArgument::Value { value } => match value {
                            CompileTimeValue::Int { value } => write!(f, "{value}")?,
                            CompileTimeValue::Bool { value } => write!(f, "{value}")?,
                            CompileTimeValue::Param { decl } => {
                                write!(f, "{}", self.decl_name(*decl))?
                            }
                        },
                    }
                }
                write!(f, ">")
            }
            TypeNode::Metatype { instance } => {
                write!(f, "Metatype<{}>", self.child(*instance))
            }
            TypeNode::Lambda {
                receiver_effect,
                inputs,
                output,
                ..
            } => {
                write!(f, "[{receiver_effect}](")?;
                for (idx, input) in inputs.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(label) = &input.label {
                        write!(f, "{label}: ")?;
                    }
                    write!(f, "{}", self.child(input.ty))?;
                }
                write!(f, ") -> {}", self.child(*output))
            }
            TypeNode::Bundle { receiver, variants } => {
                write!(f, "method[{}] {{", self.child(*receiver))?;
                for (idx, (effect, _)) in variants.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{effect}")?;
                }
                write!(f, "}}")
            }
            TypeNode::Subscript {
                capabilities,
                inputs,
                output,
                ..
            } => {
                write!(f, "subscript(")?;
                for (idx, input) in inputs.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.child(input.ty))?;
                }
                write!(f, "): {} {{", self.child(*output))?;
                for (idx, capability) in capabilities.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{capability}")?;
                }
                write!(f, "}}")
            }
            TypeNode::Parameter { convention, bare } => {
                write!(f, "{convention} {}", self.child(*bare))
            }
            TypeNode::Remote { effect, target } => {
                write!(f, "remote {effect} {}", self.child(*target))
            }
            TypeNode::Tuple { elements } => {
                write!(f, "{{")?;
                for (idx, element) in elements.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(label) = &element.label {
                        write!(f, "{label}: ")?;
                    }
                    write!(f, "{}", self.child(element.ty))?;
                }
                write!(f, "}}")
            }
            TypeNode::Sum { variants } => {
                write!(f, "Sum<")?;
                for (idx, variant) in variants.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.child(*variant))?;
                }
                write!(f, ">")
            }
            TypeNode::Existential {
                interface,
                ..
            } => match interface {
                ExistentialInterface::Views { views } => {
                    write!(f, "any ")?;
                    for (idx, view) in views.iter().enumerate() {
                        if idx > 0 {
                            write!(f, " & ")?;
                        }
                        write!(f, "{}", self.child(*view))?;
                    }
                    Ok(())
                }
                ExistentialInterface::Generic { ty } => {
                    write!(f, "any {}", self.child(*ty))
                }
            },
            TypeNode::Lens { subject, view } => {
                write!(f, "{}::{}", self.child(*subject), self.child(*view))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_structurally_equal_nodes() {
        let mut store = TypeStore::new();
        let a = store.record(DeclId(7));
        let b = store.record(DeclId(7));
        assert_eq!(a, b, "構造的に等しいノードは同じハンドルになる");
        assert_ne!(a, store.record(DeclId(8)));
    }

    #[test]
    fn flags_propagate_from_children() {
        let mut store = TypeStore::new();
        let var = store.fresh_var(0);
        let tuple = store.tuple(vec![TupleElement {
            label: None,
            ty: var,
        }]);
        assert!(store.flags(tuple).has_variable());
        assert!(!store.flags(tuple).has_error());

        let with_error = store.tuple(vec![
            TupleElement {
                label: None,
                ty: TypeId::ERROR,
            },
            TupleElement {
                label: None,
                ty: var,
            },
        ]);
        assert!(store.flags(with_error).has_error());
        assert!(store.flags(with_error).has_variable());
    }

    #[test]
    fn alias_is_not_canonical() {
        let mut store = TypeStore::new();
        let record = store.record(DeclId(1));
        assert!(store.flags(record).is_canonical());
        let alias = store.alias(DeclId(2), record);
        assert!(!store.flags(alias).is_canonical());
        let metatype = store.metatype(alias);
        assert!(
            !store.flags(metatype).is_canonical(),
            "正準性は積で伝播する"
        );
    }

    #[test]
    fn sum_normalizes_variants() {
        let mut store = TypeStore::new();
        let a = store.record(DeclId(1));
        let b = store.record(DeclId(2));
        let left = store.sum(vec![a, b]);
        let right = store.sum(vec![b, a, a]);
        assert_eq!(left, right);
        assert_eq!(store.sum(vec![a, a]), a, "1 要素に潰れた直和はその要素");
        assert_eq!(store.sum(vec![]), TypeId::NEVER);
    }

    #[test]
    fn var_id_packs_context_tag() {
        let id = VarId::new(42, 7);
        assert_eq!(id.ordinal(), 42);
        assert_eq!(id.context(), 7);
    }

    #[test]
    fn substitute_applies_mapping_recursively() {
        let mut store = TypeStore::new();
        let v0 = store.fresh_var(0);
        let v1 = store.fresh_var(0);
        let record = store.record(DeclId(3));
        let TypeNode::Var { id: var0 } = store.node(v0).clone() else {
            unreachable!()
        };
        let TypeNode::Var { id: var1 } = store.node(v1).clone() else {
            unreachable!()
        };
        let mut mapping = indexmap::IndexMap::new();
        mapping.insert(var0, v1);
        mapping.insert(var1, record);
        let tuple = store.tuple(vec![TupleElement {
            label: None,
            ty: v0,
        }]);
        let applied = store.substitute(tuple, &mapping);
        let expected = store.tuple(vec![TupleElement {
            label: None,
            ty: record,
        }]);
        assert_eq!(applied, expected);
    }

    #[test]
    fn transform_keeps_untouched_subtrees_shared() {
        let mut store = TypeStore::new();
        let a = store.record(DeclId(1));
        let b = store.record(DeclId(2));
        let pair = store.tuple(vec![
            TupleElement {
                label: None,
                ty: a,
            },
            TupleElement {
                label: None,
                ty: b,
            },
        ]);
        let unchanged = store.transform(pair, &mut |_, _| TypeTransform::Recurse);
        assert_eq!(unchanged, pair);
    }
}
