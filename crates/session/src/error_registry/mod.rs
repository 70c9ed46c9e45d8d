//! Application errors and the URI <-> error kind registry.
//!
//! An ERROR message from the peer carries a URI plus positional and
//! keyword arguments. The session turns it into an [`ApplicationError`]
//! through the [`ErrorRegistry`]: if a kind was defined for the URI, the
//! error also carries an instance of that kind, built from the arguments.
//! The raw URI and arguments are always kept, so defining a mapping only
//! changes the kind of the failure, never its payload.
//!
//! # Field population
//!
//! A kind declares its field names via [`ErrorKind::fields`]. Positional
//! args fill them in order, kwargs fill them by name, and everything that
//! does not land in a declared field is kept in [`ErrorFields::extra`]
//! (kwargs) or [`ErrorFields::extra_args`] (surplus positional args).
//!
//! The mapping also works backwards: when a local call handler fails with
//! a defined kind, its URI is looked up by type.

mod kinds;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use downcast_rs::{Downcast, impl_downcast};
use parking_lot::RwLock;
use serde_json::Value;
use wamp_protocol::{Args, Kwargs, Payload, uri};

pub use kinds::{InvalidTopic, NotAuthorized};

/// An application-defined error kind that ERROR messages can be mapped to.
pub trait ErrorKind: Downcast + fmt::Debug + fmt::Display + Send + Sync {
	/// Field names filled from positional args, in order.
	fn fields() -> &'static [&'static str]
	where
		Self: Sized;

	/// Builds the kind from populated fields.
	fn from_fields(fields: ErrorFields) -> Self
	where
		Self: Sized;

	/// Arguments sent when a local call handler fails with this kind.
	fn to_payload(&self) -> Payload;
}
impl_downcast!(ErrorKind);

/// Declared field values of an error kind plus whatever did not fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorFields {
	values: HashMap<&'static str, Value>,
	extra: Kwargs,
	extra_args: Args,
}

impl ErrorFields {
	/// Distributes `args` and `kwargs` over the declared `fields`.
	///
	/// A kwarg naming a field that a positional arg already filled is kept
	/// in `extra`.
	pub fn populate(fields: &'static [&'static str], args: &[Value], kwargs: &Kwargs) -> Self {
		let mut values: HashMap<&'static str, Value> = fields
			.iter()
			.copied()
			.zip(args.iter().cloned())
			.collect();

		let extra_args = args.iter().skip(fields.len()).cloned().collect();

		let mut extra = Kwargs::new();
		for (name, value) in kwargs {
			match fields.iter().find(|field| **field == name.as_str()) {
				Some(&field) if !values.contains_key(field) => {
					values.insert(field, value.clone());
				}
				_ => {
					extra.insert(name.clone(), value.clone());
				}
			}
		}

		Self {
			values,
			extra,
			extra_args,
		}
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.values.get(name)
	}

	/// Removes a field value.
	pub fn take(&mut self, name: &str) -> Option<Value> {
		self.values.remove(name)
	}

	/// Removes a field value as a string. Non-string JSON is rendered.
	pub fn take_string(&mut self, name: &str) -> Option<String> {
		self.take(name).map(|value| match value {
			Value::String(s) => s,
			other => other.to_string(),
		})
	}

	/// Removes a field value and deserializes it.
	pub fn take_as<T: serde::de::DeserializeOwned>(&mut self, name: &str) -> Option<T> {
		self.take(name).and_then(|value| serde_json::from_value(value).ok())
	}

	/// Kwargs that matched no declared field.
	pub fn extra(&self) -> &Kwargs {
		&self.extra
	}

	pub fn take_extra(&mut self) -> Kwargs {
		std::mem::take(&mut self.extra)
	}

	/// Positional args beyond the declared fields.
	pub fn extra_args(&self) -> &Args {
		&self.extra_args
	}
}

/// Failure reported by the peer in an ERROR message.
#[derive(Debug, Clone)]
pub struct ApplicationError {
	uri: String,
	args: Args,
	kwargs: Kwargs,
	kind: Option<Arc<dyn ErrorKind>>,
}

impl ApplicationError {
	/// Creates a generic application error without payload.
	pub fn new(uri: impl Into<String>) -> Self {
		Self {
			uri: uri.into(),
			args: Args::new(),
			kwargs: Kwargs::new(),
			kind: None,
		}
	}

	pub fn with_payload(mut self, payload: Payload) -> Self {
		let (args, kwargs) = payload.into_parts();
		self.args = args;
		self.kwargs = kwargs;
		self
	}

	pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.kwargs.insert(name.into(), value.into());
		self
	}

	pub fn uri(&self) -> &str {
		&self.uri
	}

	pub fn args(&self) -> &Args {
		&self.args
	}

	pub fn kwargs(&self) -> &Kwargs {
		&self.kwargs
	}

	pub fn payload(&self) -> Payload {
		Payload::from_parts(self.args.clone(), self.kwargs.clone())
	}

	/// The registered kind this error was mapped to, if any.
	pub fn kind(&self) -> Option<&dyn ErrorKind> {
		self.kind.as_deref()
	}

	/// Returns true if no kind was registered for the URI.
	pub fn is_generic(&self) -> bool {
		self.kind.is_none()
	}

	/// Returns true if the error was mapped to kind `K`.
	pub fn is<K: ErrorKind>(&self) -> bool {
		self.kind().is_some_and(|kind| kind.is::<K>())
	}

	pub fn downcast_ref<K: ErrorKind>(&self) -> Option<&K> {
		self.kind().and_then(|kind| kind.downcast_ref::<K>())
	}
}

impl fmt::Display for ApplicationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.kind {
			Some(kind) => write!(f, "{} ({})", kind, self.uri)?,
			None => write!(f, "Application error: {}", self.uri)?,
		}
		if !self.args.is_empty() {
			write!(f, " {}", Value::Array(self.args.clone()))?;
		}
		if !self.kwargs.is_empty() {
			write!(f, " {}", Value::Object(self.kwargs.clone()))?;
		}
		Ok(())
	}
}

impl std::error::Error for ApplicationError {}

/// Failure of a local call handler, answered to the peer with ERROR.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
	/// Sent with its own URI and payload.
	#[error(transparent)]
	Application(#[from] ApplicationError),

	/// Sent with the URI defined for the kind's type, or the runtime error
	/// URI when the kind is not defined.
	#[error("{0}")]
	Kind(Box<dyn ErrorKind>),

	/// Sent as a runtime error with the message as its only argument.
	#[error("{0}")]
	Other(String),
}

impl HandlerError {
	pub fn kind<K: ErrorKind>(kind: K) -> Self {
		HandlerError::Kind(Box::new(kind))
	}

	pub fn other(message: impl fmt::Display) -> Self {
		HandlerError::Other(message.to_string())
	}
}

impl From<crate::Error> for HandlerError {
	fn from(err: crate::Error) -> Self {
		match err {
			crate::Error::Application(app) => HandlerError::Application(app),
			other => HandlerError::Other(other.to_string()),
		}
	}
}

type BuildFn = fn(&[Value], &Kwargs) -> Arc<dyn ErrorKind>;

struct Definition {
	build: BuildFn,
	type_id: TypeId,
	type_name: &'static str,
}

fn build_kind<K: ErrorKind>(args: &[Value], kwargs: &Kwargs) -> Arc<dyn ErrorKind> {
	Arc::new(K::from_fields(ErrorFields::populate(K::fields(), args, kwargs)))
}

/// Bidirectional URI <-> error kind mapping.
#[derive(Default)]
pub struct ErrorRegistry {
	by_uri: RwLock<HashMap<String, Definition>>,
	by_type: RwLock<HashMap<TypeId, String>>,
}

impl ErrorRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Maps `uri` to kind `K`, overwriting any previous mapping for `uri`.
	pub fn define<K: ErrorKind>(&self, uri: impl Into<String>) {
		let uri = uri.into();
		let type_id = TypeId::of::<K>();
		let type_name = std::any::type_name::<K>();

		let mut by_uri = self.by_uri.write();
		let mut by_type = self.by_type.write();

		let previous = by_uri.insert(
			uri.clone(),
			Definition {
				build: build_kind::<K>,
				type_id,
				type_name,
			},
		);

		if let Some(previous) = previous.filter(|previous| previous.type_id != type_id) {
			tracing::debug!(uri = %uri, previous = previous.type_name, "error mapping overwritten");
			if by_type.get(&previous.type_id) == Some(&uri) {
				by_type.remove(&previous.type_id);
			}
		}

		by_type.insert(type_id, uri.clone());
		tracing::debug!(uri = %uri, kind = type_name, "error kind defined");
	}

	pub fn is_defined(&self, uri: &str) -> bool {
		self.by_uri.read().contains_key(uri)
	}

	/// URI most recently defined for kind `K`.
	pub fn uri_of<K: ErrorKind>(&self) -> Option<String> {
		self.by_type.read().get(&TypeId::of::<K>()).cloned()
	}

	/// URI defined for the concrete type behind `kind`.
	pub fn uri_for(&self, kind: &dyn ErrorKind) -> Option<String> {
		let type_id = Any::type_id(kind.as_any());
		self.by_type.read().get(&type_id).cloned()
	}

	/// Builds the failure for an incoming ERROR.
	pub fn to_error(&self, uri: &str, args: Args, kwargs: Kwargs) -> ApplicationError {
		let kind = self
			.by_uri
			.read()
			.get(uri)
			.map(|definition| (definition.build)(&args, &kwargs));

		ApplicationError {
			uri: uri.to_string(),
			args,
			kwargs,
			kind,
		}
	}

	/// URI and payload for the ERROR answering a failed invocation.
	pub fn to_wire(&self, err: &HandlerError) -> (String, Payload) {
		match err {
			HandlerError::Application(app) => (app.uri.clone(), app.payload()),
			HandlerError::Kind(kind) => match self.uri_for(&**kind) {
				Some(uri) => (uri, kind.to_payload()),
				None => (uri::RUNTIME_ERROR.to_string(), Payload::value(kind.to_string())),
			},
			HandlerError::Other(message) => (uri::RUNTIME_ERROR.to_string(), Payload::value(message.as_str())),
		}
	}
}
