use std::fmt::{self, Display};

use kube::Resource;

use crate::{Error, Result};

/// Cluster independent identity of a namespaced object, also used as
/// dependency key (`namespace/name`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
	pub namespace: String,
	pub name: String,
}

impl ResourceRef {
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			name: name.into(),
		}
	}

	/// Parse composite `namespace/name` key.
	///
	/// Anything but exactly two non-empty parts is not a reference.
	pub fn parse_key(key: &str) -> Option<Self> {
		let mut parts = key.split('/');
		match (parts.next(), parts.next(), parts.next()) {
			(Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
				Some(Self::new(namespace, name))
			}
			_ => None,
		}
	}

	pub fn key(&self) -> String {
		self.to_string()
	}

	/// Identity of cluster object, which should always have both namespace and name
	pub fn of<K: Resource>(obj: &K) -> Result<Self>
	where
		K::DynamicType: Default,
	{
		let meta = obj.meta();
		let name = meta.name.as_deref().filter(|n| !n.is_empty());
		let namespace = meta.namespace.as_deref().filter(|n| !n.is_empty());
		match (namespace, name) {
			(Some(namespace), Some(name)) => Ok(Self::new(namespace, name)),
			(None, _) => Err(Error::InvalidObject(
				kind_name::<K>(),
				format!("{} has no namespace", name.unwrap_or("<unnamed>")),
			)),
			(_, None) => Err(Error::InvalidObject(
				kind_name::<K>(),
				"object has no name".to_owned(),
			)),
		}
	}
}

pub(crate) fn kind_name<K: Resource>() -> String
where
	K::DynamicType: Default,
{
	K::kind(&Default::default()).into_owned()
}

impl Display for ResourceRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.namespace, self.name)
	}
}
