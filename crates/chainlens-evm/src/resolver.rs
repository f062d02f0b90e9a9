//! Type resolution: merges ABI and AST type information from every supplied
//! artifact into one [`TypeTable`].
//!
//! # How it works
//! - Every ABI parameter gets an ABI-mode type, read from the ABI JSON.
//! - When the artifact carries an AST, each ABI entry is correlated with its
//!   source declaration (by name and ABI signature, searching the contract's
//!   inheritance chain first) and gets a full-mode type as well.
//! - Node ids are only meaningful inside the compilation that produced them,
//!   so every AST reference is followed within the artifact's own
//!   compilation (see [`AstIndex`]).
//! - Structs and enums are merged by canonical name (`Vault.Position`), across
//!   compilations too. Two declarations of one name with different members
//!   are a fatal [`TypeResolutionError::Conflict`].
//! - A type reference that cannot be followed leaves that parameter without a
//!   full-mode type, which confines its entry to ABI mode.

use crate::ast::{
    AstIndex, CompilationId, DeclRef, EventDefinition, NodeId, Scope, SourceUnit, TypeName,
    VariableDeclaration,
};
use crate::bytecode::BytecodePattern;
use crate::contract::{
    ConstructorInfo, ContractTypeInfo, ErrorInfo, EventInfo, FunctionInfo, ParamInfo,
};
use alloy_core::dyn_abi::DynSolType;
use alloy_dyn_abi::Specifier;
use alloy_json_abi::{EventParam, Param};
use chainlens_core::{
    artifact::ContractArtifact,
    error::TypeResolutionError,
    types::{
        ArrayLength, ContractKind, ElementaryKind, StructMember, TypeDefinition, TypeId,
        TypeTable, TypeTableBuilder,
    },
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// A storage variable as declared, with its resolved type.
#[derive(Debug, Clone)]
pub struct StateVariableDecl {
    pub name: String,
    /// `Err` carries the reason the declared type could not be resolved.
    pub ty: Result<TypeId, String>,
}

/// The storage-relevant declarations of one AST contract.
#[derive(Debug, Clone)]
pub struct ContractDecls {
    pub id: NodeId,
    pub name: String,
    pub kind: ContractKind,
    /// solc's `linearizedBaseContracts`, most-derived first.
    pub linearized: Option<Vec<NodeId>>,
    /// Direct bases in declaration order.
    pub bases: Vec<NodeId>,
    /// Variables that occupy storage, in declaration order.
    pub variables: Vec<StateVariableDecl>,
}

/// Output of [`resolve`]: one type table shared by every contract.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub table: TypeTable,
    pub contracts: Vec<ContractTypeInfo>,
    /// Per compilation: contract node id → declarations.
    pub declarations: Vec<HashMap<NodeId, ContractDecls>>,
    /// `string`, for `Error(string)` reverts.
    pub string_ty: TypeId,
    /// `uint256`, for `Panic(uint256)` reverts.
    pub uint256_ty: TypeId,
}

impl ResolvedProject {
    pub fn contract(&self, name: &str) -> Option<&ContractTypeInfo> {
        self.contracts.iter().find(|c| c.name == name)
    }

    pub fn decls(&self, at: DeclRef) -> Option<&ContractDecls> {
        self.declarations.get(at.compilation)?.get(&at.node)
    }
}

/// Parse `uint`, `int128`, `bytes4`, `address payable` …
pub fn parse_elementary(name: &str) -> Option<ElementaryKind> {
    let name = name.trim();
    let name = name.strip_suffix(" payable").unwrap_or(name);
    let sized = |digits: &str, min: u16, max: u16, step: u16| -> Option<u16> {
        let n: u16 = digits.parse().ok()?;
        (n >= min && n <= max && n % step == 0).then_some(n)
    };
    Some(match name {
        "bool" => ElementaryKind::Bool,
        "address" => ElementaryKind::Address,
        "string" => ElementaryKind::String,
        "bytes" => ElementaryKind::Bytes,
        "byte" => ElementaryKind::FixedBytes(1),
        "uint" => ElementaryKind::Uint(256),
        "int" => ElementaryKind::Int(256),
        _ => {
            if let Some(bits) = name.strip_prefix("uint") {
                ElementaryKind::Uint(sized(bits, 8, 256, 8)?)
            } else if let Some(bits) = name.strip_prefix("int") {
                ElementaryKind::Int(sized(bits, 8, 256, 8)?)
            } else if let Some(len) = name.strip_prefix("bytes") {
                ElementaryKind::FixedBytes(sized(len, 1, 32, 1)? as u8)
            } else {
                return None;
            }
        }
    })
}

fn contract_kind(kind: &str) -> ContractKind {
    match kind {
        "interface" => ContractKind::Interface,
        "library" => ContractKind::Library,
        _ => ContractKind::Contract,
    }
}

/// Why a type could not be resolved. Only `Fatal` aborts resolution.
enum Unresolved {
    Missing(String),
    Fatal(TypeResolutionError),
}

impl From<TypeResolutionError> for Unresolved {
    fn from(e: TypeResolutionError) -> Self {
        Unresolved::Fatal(e)
    }
}

/// Keep a soft failure as a value, propagate a fatal one.
fn soften(r: Result<TypeId, Unresolved>) -> Result<Result<TypeId, String>, TypeResolutionError> {
    match r {
        Ok(t) => Ok(Ok(t)),
        Err(Unresolved::Missing(reason)) => Ok(Err(reason)),
        Err(Unresolved::Fatal(e)) => Err(e),
    }
}

struct Resolver<'a> {
    index: &'a AstIndex,
    builder: TypeTableBuilder,
    by_decl: HashMap<DeclRef, TypeId>,
    /// Canonical name → (type, member shape) for conflict detection.
    named: HashMap<String, (TypeId, String)>,
    failed: HashMap<DeclRef, String>,
}

impl<'a> Resolver<'a> {
    fn new(index: &'a AstIndex) -> Self {
        Self {
            index,
            builder: TypeTableBuilder::new(),
            by_decl: HashMap::new(),
            named: HashMap::new(),
            failed: HashMap::new(),
        }
    }

    // ── AST types ───────────────────────────────────────────────────────────

    fn type_name(&mut self, at: CompilationId, tn: &TypeName) -> Result<TypeId, Unresolved> {
        match tn {
            TypeName::ElementaryTypeName(e) => parse_elementary(&e.name)
                .map(|k| self.builder.elementary(k))
                .ok_or_else(|| Unresolved::Missing(format!("unsupported type {}", e.name))),
            TypeName::UserDefinedTypeName(u) => self.declaration(
                DeclRef::new(at, u.referenced_declaration),
                u.type_descriptions.type_string.as_deref().unwrap_or("?"),
            ),
            TypeName::ArrayTypeName(a) => {
                let element = self.type_name(at, &a.base_type)?;
                let length = match &a.length {
                    None => ArrayLength::Dynamic,
                    Some(_) => ArrayLength::Fixed(a.static_length().ok_or_else(|| {
                        Unresolved::Missing("array length is not a literal".into())
                    })?),
                };
                Ok(self.builder.intern(TypeDefinition::Array { element, length }))
            }
            TypeName::Mapping(m) => {
                let key = self.type_name(at, &m.key_type)?;
                let value = self.type_name(at, &m.value_type)?;
                Ok(self.builder.intern(TypeDefinition::Mapping { key, value }))
            }
            TypeName::FunctionTypeName(f) => match f.visibility.as_deref() {
                Some("external") => Ok(self.builder.elementary(ElementaryKind::Function)),
                _ => Err(Unresolved::Missing("internal function pointer".into())),
            },
            TypeName::Other => Err(Unresolved::Missing("unsupported type name".into())),
        }
    }

    fn declaration(&mut self, id: DeclRef, type_string: &str) -> Result<TypeId, Unresolved> {
        if let Some(t) = self.by_decl.get(&id) {
            return Ok(*t);
        }
        if let Some(reason) = self.failed.get(&id) {
            return Err(Unresolved::Missing(reason.clone()));
        }
        let index = self.index;
        if index.structs.contains_key(&id) {
            return self.struct_type(id);
        }
        if let Some((scope, def)) = index.enums.get(&id) {
            let name = def
                .canonical_name
                .clone()
                .unwrap_or_else(|| self.qualified(id.compilation, *scope, &def.name));
            let variants: Vec<String> = def.members.iter().map(|m| m.name.clone()).collect();
            let shape = variants.join(",");
            if let Some(existing) = self.check_named(&name, &shape)? {
                self.by_decl.insert(id, existing);
                return Ok(existing);
            }
            let t = self.builder.intern(TypeDefinition::Enum {
                name: name.clone(),
                variants,
            });
            self.named.insert(name, (t, shape));
            self.by_decl.insert(id, t);
            return Ok(t);
        }
        if let Some(udvt) = index.value_types.get(&id) {
            let t = self.type_name(id.compilation, &udvt.underlying_type)?;
            self.by_decl.insert(id, t);
            return Ok(t);
        }
        if let Some(c) = index.contracts.get(&id) {
            let t = self.builder.intern(TypeDefinition::Contract {
                name: c.name.clone(),
                kind: contract_kind(&c.contract_kind),
            });
            self.by_decl.insert(id, t);
            return Ok(t);
        }
        Err(Unresolved::Missing(format!(
            "unknown declaration {id} ({type_string})"
        )))
    }

    fn qualified(&self, at: CompilationId, scope: Scope, name: &str) -> String {
        match scope {
            Scope::File => name.to_string(),
            Scope::Contract(cid) => match self.index.contract(DeclRef::new(at, cid)) {
                Some(c) => format!("{}.{name}", c.name),
                None => name.to_string(),
            },
        }
    }

    /// Existing type of the same name and shape, or a conflict.
    fn check_named(&self, name: &str, shape: &str) -> Result<Option<TypeId>, Unresolved> {
        match self.named.get(name) {
            None => Ok(None),
            Some((t, existing)) if existing == shape => Ok(Some(*t)),
            Some((_, existing)) => Err(TypeResolutionError::Conflict {
                name: name.to_string(),
                first: existing.clone(),
                second: shape.to_string(),
            }
            .into()),
        }
    }

    fn struct_type(&mut self, id: DeclRef) -> Result<TypeId, Unresolved> {
        let index = self.index;
        let Some((scope, def)) = index.structs.get(&id) else {
            return Err(Unresolved::Missing(format!("unknown struct {id}")));
        };
        let name = def
            .canonical_name
            .clone()
            .unwrap_or_else(|| self.qualified(id.compilation, *scope, &def.name));
        let shape = def
            .members
            .iter()
            .map(|m| format!("{} {}", m.type_string(), m.name))
            .collect::<Vec<_>>()
            .join(",");
        if let Some(existing) = self.check_named(&name, &shape)? {
            self.by_decl.insert(id, existing);
            return Ok(existing);
        }

        // reserve first so recursive members can refer back
        let t = self.builder.reserve();
        self.by_decl.insert(id, t);
        self.named.insert(name.clone(), (t, shape));

        let mut members = Vec::with_capacity(def.members.len());
        for m in &def.members {
            let resolved = match &m.type_name {
                Some(tn) => self.type_name(id.compilation, tn),
                None => Err(Unresolved::Missing(format!("member {} has no type", m.name))),
            };
            match resolved {
                Ok(ty) => members.push(StructMember {
                    name: m.name.clone(),
                    ty,
                }),
                Err(Unresolved::Missing(reason)) => {
                    let reason = format!("struct {name}: {reason}");
                    self.by_decl.remove(&id);
                    self.named.remove(&name);
                    self.failed.insert(id, reason.clone());
                    return Err(Unresolved::Missing(reason));
                }
                Err(fatal) => return Err(fatal),
            }
        }
        self.builder.define(t, TypeDefinition::Struct { name, members });
        Ok(t)
    }

    fn variable_type(
        &mut self,
        at: CompilationId,
        v: &VariableDeclaration,
    ) -> Result<TypeId, Unresolved> {
        match &v.type_name {
            Some(tn) => self.type_name(at, tn),
            None => Err(Unresolved::Missing(format!("{} has no type name", v.name))),
        }
    }

    // ── ABI types ───────────────────────────────────────────────────────────

    #[allow(unreachable_patterns)]
    fn dyn_type(&mut self, ty: &DynSolType) -> Option<TypeId> {
        let def = match ty {
            DynSolType::Bool => TypeDefinition::Elementary(ElementaryKind::Bool),
            DynSolType::Int(n) => TypeDefinition::Elementary(ElementaryKind::Int(*n as u16)),
            DynSolType::Uint(n) => TypeDefinition::Elementary(ElementaryKind::Uint(*n as u16)),
            DynSolType::FixedBytes(n) => {
                TypeDefinition::Elementary(ElementaryKind::FixedBytes(*n as u8))
            }
            DynSolType::Address => TypeDefinition::Elementary(ElementaryKind::Address),
            DynSolType::Function => TypeDefinition::Elementary(ElementaryKind::Function),
            DynSolType::Bytes => TypeDefinition::Elementary(ElementaryKind::Bytes),
            DynSolType::String => TypeDefinition::Elementary(ElementaryKind::String),
            DynSolType::Array(inner) => TypeDefinition::Array {
                element: self.dyn_type(inner)?,
                length: ArrayLength::Dynamic,
            },
            DynSolType::FixedArray(inner, n) => TypeDefinition::Array {
                element: self.dyn_type(inner)?,
                length: ArrayLength::Fixed(*n as u64),
            },
            DynSolType::Tuple(items) => TypeDefinition::Tuple(
                items
                    .iter()
                    .map(|t| self.dyn_type(t))
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => return None,
        };
        Some(self.builder.intern(def))
    }

    fn abi_param<S: Specifier<DynSolType>>(
        &mut self,
        contract: &str,
        ty: &str,
        param: &S,
    ) -> Result<TypeId, TypeResolutionError> {
        let invalid = |reason: String| TypeResolutionError::InvalidAbiType {
            contract: contract.to_string(),
            ty: ty.to_string(),
            reason,
        };
        let resolved = param.resolve().map_err(|e| invalid(e.to_string()))?;
        self.dyn_type(&resolved)
            .ok_or_else(|| invalid("unsupported ABI type".into()))
    }

    fn params(
        &mut self,
        contract: &str,
        params: &[Param],
    ) -> Result<Vec<ParamInfo>, TypeResolutionError> {
        params
            .iter()
            .map(|p| {
                Ok(ParamInfo {
                    name: p.name.clone(),
                    abi_ty: self.abi_param(contract, &p.ty, p)?,
                    full_ty: None,
                    indexed: false,
                })
            })
            .collect()
    }

    fn event_params(
        &mut self,
        contract: &str,
        params: &[EventParam],
    ) -> Result<Vec<ParamInfo>, TypeResolutionError> {
        params
            .iter()
            .map(|p| {
                Ok(ParamInfo {
                    name: p.name.clone(),
                    abi_ty: self.abi_param(contract, &p.ty, p)?,
                    full_ty: None,
                    indexed: p.indexed,
                })
            })
            .collect()
    }

    // ── correlation ─────────────────────────────────────────────────────────

    /// Resolve `decls` and keep them if their ABI shapes equal `params`'.
    fn matching_types(
        &mut self,
        at: CompilationId,
        params: &[ParamInfo],
        decls: &[VariableDeclaration],
    ) -> Result<Option<Vec<TypeId>>, TypeResolutionError> {
        if params.len() != decls.len() {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(decls.len());
        for (p, d) in params.iter().zip(decls) {
            let Ok(t) = soften(self.variable_type(at, d))? else {
                return Ok(None);
            };
            if p.indexed != d.indexed {
                return Ok(None);
            }
            out.push(t);
        }
        Ok(self.same_abi_shape(params, &out).then_some(out))
    }

    fn same_abi_shape(&self, params: &[ParamInfo], full: &[TypeId]) -> bool {
        params.len() == full.len()
            && params.iter().zip(full).all(|(p, t)| {
                let abi = self.builder.abi_type_string(p.abi_ty);
                abi.is_some() && abi == self.builder.abi_type_string(*t)
            })
    }

    fn assign(params: &mut [ParamInfo], types: Vec<TypeId>) {
        for (p, t) in params.iter_mut().zip(types) {
            p.full_ty = Some(t);
        }
    }

    fn correlate_function(
        &mut self,
        at: CompilationId,
        ancestry: &[NodeId],
        f: &mut FunctionInfo,
    ) -> Result<(), TypeResolutionError> {
        let index = self.index;
        for cid in ancestry {
            let Some(c) = index.contract(DeclRef::new(at, *cid)) else { continue };
            for def in c.functions() {
                if def.name != f.name || matches!(def.kind.as_deref(), Some(k) if k != "function") {
                    continue;
                }
                let Some(inputs) =
                    self.matching_types(at, &f.inputs, &def.parameters.parameters)?
                else {
                    continue;
                };
                Self::assign(&mut f.inputs, inputs);
                if let Some(outputs) =
                    self.matching_types(at, &f.outputs, &def.return_parameters.parameters)?
                {
                    Self::assign(&mut f.outputs, outputs);
                }
                return Ok(());
            }
            // public state variables have compiler-generated getters
            for v in c.state_variables() {
                if v.name != f.name || v.visibility.as_deref() != Some("public") {
                    continue;
                }
                let Ok(ty) = soften(self.variable_type(at, v))? else { continue };
                let (inputs, outputs) = self.getter_types(ty);
                if self.same_abi_shape(&f.inputs, &inputs) {
                    Self::assign(&mut f.inputs, inputs);
                    if self.same_abi_shape(&f.outputs, &outputs) {
                        Self::assign(&mut f.outputs, outputs);
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Parameter and return types of the getter of a public variable.
    fn getter_types(&mut self, mut ty: TypeId) -> (Vec<TypeId>, Vec<TypeId>) {
        let mut inputs = Vec::new();
        loop {
            match self.builder.get(ty).cloned() {
                Some(TypeDefinition::Mapping { key, value }) => {
                    inputs.push(key);
                    ty = value;
                }
                Some(TypeDefinition::Array { element, .. }) => {
                    inputs.push(self.builder.elementary(ElementaryKind::Uint(256)));
                    ty = element;
                }
                _ => break,
            }
        }
        let outputs = match self.builder.get(ty) {
            Some(TypeDefinition::Struct { members, .. }) => members
                .iter()
                .filter(|m| {
                    !matches!(
                        self.builder.get(m.ty),
                        Some(TypeDefinition::Mapping { .. } | TypeDefinition::Array { .. })
                    )
                })
                .map(|m| m.ty)
                .collect(),
            _ => vec![ty],
        };
        (inputs, outputs)
    }

    /// Contracts to search for a declaration: the ancestry first, then every
    /// other contract, own compilation before the rest.
    fn search_order(&self, at: CompilationId, ancestry: &[NodeId]) -> Vec<DeclRef> {
        let mut others: Vec<DeclRef> = self
            .index
            .contracts
            .keys()
            .filter(|r| !(r.compilation == at && ancestry.contains(&r.node)))
            .copied()
            .collect();
        others.sort_by_key(|r| (r.compilation != at, *r));
        ancestry
            .iter()
            .map(|id| DeclRef::new(at, *id))
            .chain(others)
            .collect()
    }

    fn correlate_event(
        &mut self,
        at: CompilationId,
        ancestry: &[NodeId],
        e: &mut EventInfo,
    ) -> Result<(), TypeResolutionError> {
        let index = self.index;
        let candidates: Vec<(CompilationId, &EventDefinition)> = self
            .search_order(at, ancestry)
            .into_iter()
            .filter_map(|r| index.contract(r).map(|c| (r.compilation, c)))
            .flat_map(|(comp, c)| c.events().map(move |d| (comp, d)))
            .chain(index.file_events.iter().map(|(comp, d)| (*comp, d)))
            .filter(|(_, d)| d.name == e.name && d.anonymous == e.anonymous)
            .collect();
        for (comp, def) in candidates {
            if let Some(types) = self.matching_types(comp, &e.inputs, &def.parameters.parameters)? {
                Self::assign(&mut e.inputs, types);
                return Ok(());
            }
        }
        Ok(())
    }

    fn correlate_error(
        &mut self,
        at: CompilationId,
        ancestry: &[NodeId],
        e: &mut ErrorInfo,
    ) -> Result<(), TypeResolutionError> {
        let index = self.index;
        let candidates: Vec<_> = self
            .search_order(at, ancestry)
            .into_iter()
            .filter_map(|r| index.contract(r).map(|c| (r.compilation, c)))
            .flat_map(|(comp, c)| c.errors().map(move |d| (comp, d)))
            .chain(index.file_errors.iter().map(|(comp, d)| (*comp, d)))
            .filter(|(_, d)| d.name == e.name)
            .collect();
        for (comp, def) in candidates {
            if let Some(types) = self.matching_types(comp, &e.inputs, &def.parameters.parameters)? {
                Self::assign(&mut e.inputs, types);
                return Ok(());
            }
        }
        Ok(())
    }

    fn correlate_constructor(
        &mut self,
        contract: DeclRef,
        ctor: &mut ConstructorInfo,
    ) -> Result<(), TypeResolutionError> {
        let index = self.index;
        let Some(c) = index.contract(contract) else {
            return Ok(());
        };
        for def in c.functions() {
            if def.kind.as_deref() != Some("constructor") {
                continue;
            }
            if let Some(types) =
                self.matching_types(contract.compilation, &ctor.inputs, &def.parameters.parameters)?
            {
                Self::assign(&mut ctor.inputs, types);
            }
        }
        Ok(())
    }

    /// `contract` and all its ancestors, most-derived first when solc's
    /// linearisation is present.
    fn ancestry(&self, contract: DeclRef) -> Vec<NodeId> {
        if let Some(lin) = self
            .index
            .contract(contract)
            .and_then(|c| c.linearized_base_contracts.clone())
        {
            return lin;
        }
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![contract.node];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(c) = self.index.contract(contract.at(id)) {
                stack.extend(c.base_ids().into_iter().rev());
            }
        }
        order
    }

    // ── contracts ───────────────────────────────────────────────────────────

    fn contract_info(
        &mut self,
        index: usize,
        artifact: &ContractArtifact,
        unit: Option<(CompilationId, &SourceUnit)>,
    ) -> Result<ContractTypeInfo, TypeResolutionError> {
        let name = artifact.contract_name.as_str();
        let ast_id = unit.and_then(|(at, u)| {
            AstIndex::find_in_unit(u, name).map(|id| DeclRef::new(at, id))
        });
        if unit.is_some() && ast_id.is_none() {
            warn!(contract = name, "AST does not declare the contract; using ABI only");
        }
        let ancestry = ast_id.map(|id| self.ancestry(id)).unwrap_or_default();
        let kind = ast_id
            .and_then(|id| self.index.contract(id))
            .map(|c| contract_kind(&c.contract_kind))
            .unwrap_or_default();

        let mut functions = Vec::new();
        for f in artifact.abi.functions() {
            let mut info = FunctionInfo {
                name: f.name.clone(),
                signature: f.signature(),
                selector: f.selector().0,
                inputs: self.params(name, &f.inputs)?,
                outputs: self.params(name, &f.outputs)?,
            };
            if let Some(id) = ast_id {
                self.correlate_function(id.compilation, &ancestry, &mut info)?;
            }
            functions.push(info);
        }

        let mut events = Vec::new();
        for e in artifact.abi.events() {
            let mut info = EventInfo {
                name: e.name.clone(),
                signature: e.signature(),
                topic: e.selector(),
                anonymous: e.anonymous,
                inputs: self.event_params(name, &e.inputs)?,
            };
            if let Some(id) = ast_id {
                self.correlate_event(id.compilation, &ancestry, &mut info)?;
            }
            events.push(info);
        }

        let mut errors = Vec::new();
        for e in artifact.abi.errors() {
            let mut info = ErrorInfo {
                name: e.name.clone(),
                signature: e.signature(),
                selector: e.selector().0,
                inputs: self.params(name, &e.inputs)?,
            };
            if let Some(id) = ast_id {
                self.correlate_error(id.compilation, &ancestry, &mut info)?;
            }
            errors.push(info);
        }

        let constructor = match artifact.abi.constructor() {
            Some(c) => {
                let mut info = ConstructorInfo {
                    inputs: self.params(name, &c.inputs)?,
                };
                if let Some(id) = ast_id {
                    self.correlate_constructor(id, &mut info)?;
                }
                Some(info)
            }
            None => None,
        };

        let deployments: BTreeMap<_, _> = artifact
            .networks
            .iter()
            .map(|(net, d)| (net.clone(), d.address))
            .collect();

        debug!(
            contract = name,
            ast = ast_id.is_some(),
            functions = functions.len(),
            events = events.len(),
            "resolved contract"
        );

        Ok(ContractTypeInfo {
            name: name.to_string(),
            index,
            kind,
            abi: artifact.abi.clone(),
            ast_id,
            linearization: ancestry,
            functions,
            events,
            errors,
            constructor,
            has_fallback: artifact.abi.fallback.is_some(),
            has_receive: artifact.abi.receive.is_some(),
            creation_code: artifact.bytecode.as_deref().and_then(BytecodePattern::parse),
            runtime_code: artifact
                .deployed_bytecode
                .as_deref()
                .and_then(BytecodePattern::parse),
            deployments,
        })
    }

    fn declarations(
        &mut self,
    ) -> Result<Vec<HashMap<NodeId, ContractDecls>>, TypeResolutionError> {
        let index = self.index;
        let mut ids: Vec<DeclRef> = index.contracts.keys().copied().collect();
        ids.sort_unstable();
        let mut out = vec![HashMap::new(); index.compilation_count()];
        for id in ids {
            let Some(c) = index.contract(id) else { continue };
            let mut variables = Vec::new();
            for v in c.state_variables().filter(|v| v.is_stored()) {
                variables.push(StateVariableDecl {
                    name: v.name.clone(),
                    ty: soften(self.variable_type(id.compilation, v))?,
                });
            }
            out[id.compilation].insert(
                id.node,
                ContractDecls {
                    id: id.node,
                    name: c.name.clone(),
                    kind: contract_kind(&c.contract_kind),
                    linearized: c.linearized_base_contracts.clone(),
                    bases: c.base_ids(),
                    variables,
                },
            );
        }
        Ok(out)
    }
}

/// Parse an artifact's AST. Unusable ASTs are reported and treated as absent.
pub fn parse_ast(artifact: &ContractArtifact) -> Option<SourceUnit> {
    let ast = artifact.ast.as_ref()?;
    match serde_json::from_value::<SourceUnit>(ast.clone()) {
        Ok(unit) => Some(unit),
        Err(e) => {
            warn!(contract = %artifact.contract_name, error = %e, "unparseable AST; using ABI only");
            None
        }
    }
}

/// Resolve every artifact into one project-wide type table.
pub fn resolve(artifacts: &[ContractArtifact]) -> Result<ResolvedProject, TypeResolutionError> {
    let units: Vec<Option<SourceUnit>> = artifacts.iter().map(parse_ast).collect();
    let mut index = AstIndex::default();
    let placed: Vec<Option<CompilationId>> = units
        .iter()
        .map(|u| u.as_ref().map(|u| index.add_source_unit(u)))
        .collect();
    if index.compilation_count() > 1 {
        debug!(
            compilations = index.compilation_count(),
            "artifacts come from separate compilations"
        );
    }

    let mut resolver = Resolver::new(&index);
    let declarations = resolver.declarations()?;
    let contracts = artifacts
        .iter()
        .zip(units.iter().zip(&placed))
        .enumerate()
        .map(|(i, (artifact, (unit, at)))| {
            let located = at.zip(unit.as_ref());
            resolver.contract_info(i, artifact, located)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let string_ty = resolver.builder.elementary(ElementaryKind::String);
    let uint256_ty = resolver.builder.elementary(ElementaryKind::Uint(256));

    let table = resolver.builder.finish();
    debug!(
        contracts = contracts.len(),
        types = table.len(),
        "type resolution complete"
    );
    Ok(ResolvedProject {
        table,
        contracts,
        declarations,
        string_ty,
        uint256_ty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elementary_names() {
        assert_eq!(parse_elementary("uint"), Some(ElementaryKind::Uint(256)));
        assert_eq!(parse_elementary("int24"), Some(ElementaryKind::Int(24)));
        assert_eq!(parse_elementary("bytes4"), Some(ElementaryKind::FixedBytes(4)));
        assert_eq!(parse_elementary("address payable"), Some(ElementaryKind::Address));
        assert_eq!(parse_elementary("uint7"), None);
        assert_eq!(parse_elementary("bytes33"), None);
        assert_eq!(parse_elementary("fixed128x18"), None);
    }
}
