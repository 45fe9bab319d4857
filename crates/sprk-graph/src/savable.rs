use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use sprk_types::TypeKey;

use crate::error::{GraphError, GraphResult};
use crate::reader::GraphReader;
use crate::writer::GraphWriter;

/// Upcasts to [`Any`] for downcasting decoded objects back to concrete types.
///
/// Implemented for every `'static` type; savables never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// An object that encodes and decodes its own fields.
///
/// Implementations call back into the writer/reader once per field, in the
/// same order on both sides. The engine knows nothing about a type's layout
/// beyond what this pair encodes.
///
/// Types are decoded by default-constructing them through a
/// [`TypeRegistry`](crate::TypeRegistry) and then calling [`Savable::read`],
/// so every registered type also implements `Default`.
pub trait Savable: AsAny {
    /// Stable, fully-qualified type name. Hashed into the [`TypeKey`]
    /// written in front of every encoded instance.
    fn type_name(&self) -> &'static str;

    /// Write this object's fields.
    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()>;

    /// Populate this (default-constructed) object from the reader.
    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()>;

    /// Wire key for this object's type.
    fn type_key(&self) -> TypeKey {
        TypeKey::of(self.type_name())
    }
}

/// Address and concrete type of a savable.
pub(crate) type Identity = (usize, TypeId);

/// Identity of a savable: the address of its data plus its concrete type.
///
/// Two value-equal objects at different addresses have different identities.
/// A struct and a savable field stored inline at offset 0 share an address,
/// so the type is part of the identity.
pub(crate) fn identity_of(value: &dyn Savable) -> Identity {
    let address = value as *const dyn Savable as *const () as usize;
    (address, value.as_any().type_id())
}

/// Shared, interior-mutable handle to a savable.
///
/// Shared and external edges are held as `SavableRef`s so that several
/// parents can point at the same instance and so that the engine can track
/// identity. Cloning the handle clones the pointer, not the object.
#[derive(Clone)]
pub struct SavableRef(Rc<RefCell<dyn Savable>>);

impl SavableRef {
    pub fn new<T: Savable>(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Returns `true` if both handles point at the same object.
    pub fn ptr_eq(&self, other: &SavableRef) -> bool {
        self.identity() == other.identity()
    }

    pub(crate) fn identity(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }

    /// Borrow the object, failing instead of panicking if it is mutably borrowed.
    pub fn try_borrow(&self) -> GraphResult<Ref<'_, dyn Savable>> {
        self.0.try_borrow().map_err(|_| GraphError::Borrowed)
    }

    pub fn try_borrow_mut(&self) -> GraphResult<RefMut<'_, dyn Savable>> {
        self.0.try_borrow_mut().map_err(|_| GraphError::Borrowed)
    }

    /// Borrow the object as a concrete type.
    ///
    /// Returns `None` if the object is of another type or is mutably borrowed.
    pub fn downcast_ref<T: Savable>(&self) -> Option<Ref<'_, T>> {
        let borrowed = self.0.try_borrow().ok()?;
        Ref::filter_map(borrowed, |value| value.as_any().downcast_ref::<T>()).ok()
    }

    pub fn downcast_mut<T: Savable>(&self) -> Option<RefMut<'_, T>> {
        let borrowed = self.0.try_borrow_mut().ok()?;
        RefMut::filter_map(borrowed, |value| value.as_any_mut().downcast_mut::<T>()).ok()
    }

    /// Returns `true` if the object is a `T`.
    pub fn is<T: Savable>(&self) -> bool {
        self.0
            .try_borrow()
            .map(|value| (*value).as_any().is::<T>())
            .unwrap_or(false)
    }

    /// Type name of the referenced object.
    pub fn type_name(&self) -> GraphResult<&'static str> {
        Ok(self.try_borrow()?.type_name())
    }

    /// Number of live handles to this object.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for SavableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => write!(f, "SavableRef({} @ {:#x})", value.type_name(), self.identity()),
            Err(_) => write!(f, "SavableRef(<borrowed> @ {:#x})", self.identity()),
        }
    }
}

/// Downcast an owned, decoded savable into a concrete type.
pub(crate) fn downcast_box<T: Savable>(value: Box<dyn Savable>) -> GraphResult<T> {
    let actual = value.type_name();
    value
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| GraphError::TypeMismatch {
            expected: std::any::type_name::<T>().into(),
            actual: actual.into(),
        })
}
