//! Call signature canonicalization.
//!
//! A [`FunctionIdentity`] declares a wrapped function's parameters once, at
//! registration. Per call, [`bind`] maps positional and keyword [`Args`] onto
//! those parameters (filling declared defaults), and [`encode`] turns the
//! bound arguments into a [`CallSignature`] whose canonical bytes are stable
//! across runs and independent of keyword order at the call site.
//!
//! The data parameter never contributes its content to the signature: it is
//! recorded as `null` plus its declared type tag. Its identity enters the
//! cache key only through the separately carried input hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

use crate::error::CacheError;
use crate::hasher::{canonical_json_bytes, canonicalize_json, structural_hash};

/// A non-data argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// An explicit null / "no value".
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number. Non-finite values cannot be canonicalized.
    Float(f64),
    /// A string.
    Str(String),
    /// A list of values.
    List(Vec<ParamValue>),
    /// An already-canonical structured value, typically produced through
    /// [`CanonicalParam`].
    Json(Value),
    /// A value that has no canonical form. Accepted for bypassed calls,
    /// rejected when a signature has to be built.
    Opaque {
        /// Rust type name of the value, used in error messages.
        type_name: String,
    },
}

impl ParamValue {
    /// An opaque placeholder for a value of type `T`.
    pub fn opaque<T: ?Sized>() -> Self {
        Self::Opaque {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Canonicalizes a host-defined value, falling back to
    /// [`ParamValue::Opaque`] if it declines.
    pub fn canonical<T: CanonicalParam>(value: &T) -> Self {
        match value.canonicalize() {
            Some(v) => Self::Json(v),
            None => Self::opaque::<T>(),
        }
    }

    /// Integer view (`Int` only).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Json(v) => v.as_str(),
            _ => None,
        }
    }

    /// Canonical JSON form, or a [`CacheError::Signature`] naming `parameter`.
    pub fn to_canonical_json(&self, parameter: &str) -> Result<Value, CacheError> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Int(i) => Ok(Value::from(*i)),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
                CacheError::signature(parameter, format!("non-finite float {f}"))
            }),
            Self::Str(s) => Ok(Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(|item| item.to_canonical_json(parameter))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Json(v) => Ok(canonicalize_json(v)),
            Self::Opaque { type_name } => Err(CacheError::signature(
                parameter,
                format!("opaque value of type {type_name} has no canonical form"),
            )),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Json(Value::from(v)),
        }
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::from(v as u64)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Host-supplied canonicalization for parameter types the engine does not
/// know natively.
///
/// Implementations must be deterministic: equal values return equal JSON.
/// Returning `None` marks the value as uncacheable.
pub trait CanonicalParam {
    /// Canonical structured form of `self`.
    fn canonicalize(&self) -> Option<Value>;
}

/// Role of a declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// The data object argument.
    Data {
        /// Declared type tag recorded in the signature (e.g. `"DataArray"`).
        type_tag: String,
    },
    /// An ordinary argument, optionally with a declared default.
    Value {
        /// Default used when the call does not supply the argument.
        default: Option<ParamValue>,
    },
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Data or value parameter.
    pub kind: ParamKind,
}

/// A wrapped function's stable name and declared parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionIdentity {
    name: String,
    params: Vec<ParamSpec>,
}

impl FunctionIdentity {
    /// Starts a declaration for the function `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declares the data parameter.
    pub fn data(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind: ParamKind::Data {
                type_tag: type_tag.into(),
            },
        });
        self
    }

    /// Declares a required value parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind: ParamKind::Value { default: None },
        });
        self
    }

    /// Declares a value parameter with a default.
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<ParamValue>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind: ParamKind::Value {
                default: Some(default.into()),
            },
        });
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters in declaration order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Looks up a declared parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The data parameter's name and type tag.
    pub fn data_param(&self) -> Option<(&str, &str)> {
        self.params.iter().find_map(|p| match &p.kind {
            ParamKind::Data { type_tag } => Some((p.name.as_str(), type_tag.as_str())),
            ParamKind::Value { .. } => None,
        })
    }

    fn value_params(&self) -> impl Iterator<Item = (&str, Option<&ParamValue>)> {
        self.params.iter().filter_map(|p| match &p.kind {
            ParamKind::Value { default } => Some((p.name.as_str(), default.as_ref())),
            ParamKind::Data { .. } => None,
        })
    }

    /// Checks the declaration: a non-empty name, exactly one data parameter
    /// and unique parameter names.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.name.is_empty() {
            return Err(CacheError::signature("<function>", "function name is empty"));
        }
        let data_count = self
            .params
            .iter()
            .filter(|p| matches!(p.kind, ParamKind::Data { .. }))
            .count();
        if data_count != 1 {
            return Err(CacheError::signature(
                "<data>",
                format!(
                    "'{}' must declare exactly one data parameter, found {data_count}",
                    self.name
                ),
            ));
        }
        for (i, p) in self.params.iter().enumerate() {
            if p.name.is_empty() {
                return Err(CacheError::signature("<unnamed>", "parameter name is empty"));
            }
            if self.params[..i].iter().any(|q| q.name == p.name) {
                return Err(CacheError::signature(&p.name, "declared more than once"));
            }
        }
        Ok(())
    }
}

/// Positional and keyword arguments of one call, excluding the data object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<ParamValue>,
    keyword: Vec<(String, ParamValue)>,
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<ParamValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    /// Positional arguments in call order.
    pub fn positional(&self) -> &[ParamValue] {
        &self.positional
    }

    /// Keyword arguments in call order.
    pub fn keywords(&self) -> &[(String, ParamValue)] {
        &self.keyword
    }
}

/// Arguments bound to declared value parameters, defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs(BTreeMap<String, ParamValue>);

impl BoundArgs {
    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Integer bound to `name`.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    /// Number bound to `name`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Boolean bound to `name`.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// String bound to `name`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Bound values in parameter-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the function has no value parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Binds call arguments to a function's declared value parameters.
///
/// Positionals fill value parameters in declaration order, keywords bind by
/// name, and anything still unbound takes its declared default.
pub fn bind(identity: &FunctionIdentity, args: &Args) -> Result<BoundArgs, CacheError> {
    let value_params: Vec<(&str, Option<&ParamValue>)> = identity.value_params().collect();

    if args.positional.len() > value_params.len() {
        return Err(CacheError::signature(
            format!("<positional #{}>", value_params.len() + 1),
            format!(
                "'{}' takes {} positional argument(s) but {} were given",
                identity.name,
                value_params.len(),
                args.positional.len()
            ),
        ));
    }

    let mut bound = BTreeMap::new();
    for ((name, _), value) in value_params.iter().zip(&args.positional) {
        bound.insert((*name).to_string(), value.clone());
    }

    for (name, value) in &args.keyword {
        match identity.get(name).map(|p| &p.kind) {
            None => {
                return Err(CacheError::signature(name, "unexpected keyword argument"));
            }
            Some(ParamKind::Data { .. }) => {
                return Err(CacheError::signature(
                    name,
                    "is the data parameter and cannot be passed as a keyword",
                ));
            }
            Some(ParamKind::Value { .. }) => {
                if bound.insert(name.clone(), value.clone()).is_some() {
                    return Err(CacheError::signature(name, "got multiple values"));
                }
            }
        }
    }

    for (name, default) in value_params {
        if bound.contains_key(name) {
            continue;
        }
        match default {
            Some(d) => {
                bound.insert(name.to_string(), d.clone());
            }
            None => return Err(CacheError::signature(name, "missing required argument")),
        }
    }

    Ok(BoundArgs(bound))
}

/// Canonical record of one call.
///
/// `parameters` holds every declared parameter; the data parameter maps to
/// `null` and its type tag is kept in `data_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSignature {
    /// Wrapped function name.
    pub function_name: String,
    /// Declared type tag of the data parameter.
    pub data_type: String,
    /// Parameter name to canonical value.
    pub parameters: BTreeMap<String, Value>,
}

impl CallSignature {
    /// Human-readable record stored in result attributes.
    pub fn to_record(&self) -> String {
        String::from_utf8_lossy(&to_canonical_bytes(self)).into_owned()
    }

    /// Parses a record produced by [`CallSignature::to_record`].
    pub fn from_record(record: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(record)
    }
}

/// Encodes a bound call into its canonical signature.
pub fn encode(identity: &FunctionIdentity, bound: &BoundArgs) -> Result<CallSignature, CacheError> {
    let mut data_type = None;
    let mut parameters = BTreeMap::new();

    for spec in &identity.params {
        let value = match &spec.kind {
            ParamKind::Data { type_tag } => {
                data_type = Some(type_tag.clone());
                Value::Null
            }
            ParamKind::Value { .. } => bound
                .get(&spec.name)
                .ok_or_else(|| CacheError::signature(&spec.name, "argument was not bound"))?
                .to_canonical_json(&spec.name)?,
        };
        parameters.insert(spec.name.clone(), value);
    }

    let data_type = data_type.ok_or_else(|| {
        CacheError::signature("<data>", format!("'{}' declares no data parameter", identity.name))
    })?;

    Ok(CallSignature {
        function_name: identity.name.clone(),
        data_type,
        parameters,
    })
}

/// Stable byte encoding of a signature: JSON with sorted keys, no whitespace.
pub fn to_canonical_bytes(signature: &CallSignature) -> Vec<u8> {
    let parameters: Map<String, Value> = signature
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let value = json!({
        "function_name": signature.function_name,
        "data_type": signature.data_type,
        "parameters": Value::Object(parameters),
    });
    canonical_json_bytes(&value)
}

/// Structural hash of a signature.
pub fn signature_hash(signature: &CallSignature) -> String {
    structural_hash(&to_canonical_bytes(signature))
}
