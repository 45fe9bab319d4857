//! Savable types shared by the unit tests.

use crate::config::WriterConfig;
use crate::error::{GraphError, GraphResult};
use crate::reader::GraphReader;
use crate::registry::TypeRegistry;
use crate::savable::{Savable, SavableRef};
use crate::writer::{GraphSummary, GraphWriter};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Leaf {
    pub value: i32,
}

impl Leaf {
    pub fn new(value: i32) -> Self {
        Self { value }
    }
}

impl Savable for Leaf {
    fn type_name(&self) -> &'static str {
        "sprk.test.Leaf"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write(self.value)
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.value = reader.read()?;
        Ok(())
    }
}

/// Holds a leaf inline as its first field, at the wrapper's own address.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Wrapper {
    pub inner: Leaf,
}

impl Wrapper {
    pub fn new(value: i32) -> Self {
        Self {
            inner: Leaf::new(value),
        }
    }
}

impl Savable for Wrapper {
    fn type_name(&self) -> &'static str {
        "sprk.test.Wrapper"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_savable(Some(&self.inner))
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.inner = reader
            .read_savable_as::<Leaf>()?
            .ok_or_else(|| GraphError::Malformed {
                field: "inner",
                reason: "null leaf".into(),
            })?;
        Ok(())
    }
}

/// Named node with a shared edge to a leaf.
#[derive(Debug, Default)]
pub struct Parent {
    pub name: String,
    pub leaf: Option<SavableRef>,
}

impl Parent {
    pub fn new(name: &str, leaf: Option<SavableRef>) -> Self {
        Self {
            name: name.into(),
            leaf,
        }
    }

    pub fn leaf_value(&self) -> Option<i32> {
        let leaf = self.leaf.as_ref()?;
        let value = leaf.downcast_ref::<Leaf>()?.value;
        Some(value)
    }
}

impl Savable for Parent {
    fn type_name(&self) -> &'static str {
        "sprk.test.Parent"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_str(&self.name)?;
        writer.write_shared(self.leaf.as_ref())
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.name = reader.read_string()?;
        self.leaf = reader.read_shared()?;
        Ok(())
    }
}

/// Owns its children directly.
#[derive(Debug, Default)]
pub struct Root {
    pub children: Vec<Parent>,
}

impl Savable for Root {
    fn type_name(&self) -> &'static str {
        "sprk.test.Root"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_savable_array(Some(self.children.as_slice()))
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.children = reader.read_savable_array()?.unwrap_or_default();
        Ok(())
    }
}

/// Linked-list node whose `next` edge is either direct or shared.
#[derive(Debug, Default)]
pub struct Link {
    pub label: String,
    pub shared: bool,
    pub next: Option<SavableRef>,
}

impl Link {
    pub fn direct(label: &str, next: Option<SavableRef>) -> Self {
        Self {
            label: label.into(),
            shared: false,
            next,
        }
    }

    pub fn shared(label: &str, next: Option<SavableRef>) -> Self {
        Self {
            label: label.into(),
            shared: true,
            next,
        }
    }
}

impl Savable for Link {
    fn type_name(&self) -> &'static str {
        "sprk.test.Link"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_str(&self.label)?;
        writer.write(self.shared)?;
        if self.shared {
            writer.write_shared(self.next.as_ref())
        } else {
            writer.write_object(self.next.as_ref())
        }
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.label = reader.read_string()?;
        self.shared = reader.read()?;
        self.next = if self.shared {
            reader.read_shared()?
        } else {
            reader.read_object()?
        };
        Ok(())
    }
}

/// Collections of handles: `items` shared, `owned` written inline.
#[derive(Debug, Default)]
pub struct Bag {
    pub items: Vec<SavableRef>,
    pub owned: Vec<SavableRef>,
}

impl Bag {
    pub fn shared(items: Vec<SavableRef>) -> Self {
        Self {
            items,
            owned: Vec::new(),
        }
    }
}

impl Savable for Bag {
    fn type_name(&self) -> &'static str {
        "sprk.test.Bag"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_shared_array(Some(self.items.as_slice()))?;
        writer.write_object_array(Some(self.owned.as_slice()))
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.items = reader
            .read_shared_array()?
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        self.owned = reader.read_object_array()?.unwrap_or_default();
        Ok(())
    }
}

/// Holds one external edge.
#[derive(Debug, Default)]
pub struct Holder {
    pub label: String,
    pub asset: Option<SavableRef>,
}

impl Holder {
    pub fn new(label: &str, asset: Option<SavableRef>) -> Self {
        Self {
            label: label.into(),
            asset,
        }
    }
}

impl Savable for Holder {
    fn type_name(&self) -> &'static str {
        "sprk.test.Holder"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write_str(&self.label)?;
        writer.write_external(self.asset.as_ref())
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.label = reader.read_string()?;
        self.asset = reader.read_external()?;
        Ok(())
    }
}

/// One field of every primitive and container kind.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scalars {
    pub flag: bool,
    pub byte: u8,
    pub tiny: i8,
    pub short: i16,
    pub ushort: u16,
    pub int: i32,
    pub uint: u32,
    pub long: i64,
    pub ulong: u64,
    pub float: f32,
    pub double: f64,
    pub text: String,
    pub blob: Vec<u8>,
    pub ints: Option<Vec<i32>>,
    pub doubles: Option<Vec<f64>>,
    pub names: Option<Vec<String>>,
    pub leaves: Option<Vec<Leaf>>,
    pub nested: Option<Box<Scalars>>,
}

impl Savable for Scalars {
    fn type_name(&self) -> &'static str {
        "sprk.test.Scalars"
    }

    fn write(&self, writer: &mut GraphWriter<'_>) -> GraphResult<()> {
        writer.write(self.flag)?;
        writer.write(self.byte)?;
        writer.write(self.tiny)?;
        writer.write(self.short)?;
        writer.write(self.ushort)?;
        writer.write(self.int)?;
        writer.write(self.uint)?;
        writer.write(self.long)?;
        writer.write(self.ulong)?;
        writer.write(self.float)?;
        writer.write(self.double)?;
        writer.write_str(&self.text)?;
        writer.write_bytes(&self.blob)?;
        writer.write_array(self.ints.as_deref())?;
        writer.write_array(self.doubles.as_deref())?;
        writer.write_str_array(self.names.as_deref())?;
        writer.write_savable_array(self.leaves.as_deref())?;
        writer.write_savable(self.nested.as_deref().map(|n| n as &dyn Savable))
    }

    fn read(&mut self, reader: &mut GraphReader<'_>) -> GraphResult<()> {
        self.flag = reader.read()?;
        self.byte = reader.read()?;
        self.tiny = reader.read()?;
        self.short = reader.read()?;
        self.ushort = reader.read()?;
        self.int = reader.read()?;
        self.uint = reader.read()?;
        self.long = reader.read()?;
        self.ulong = reader.read()?;
        self.float = reader.read()?;
        self.double = reader.read()?;
        self.text = reader.read_string()?;
        self.blob = reader.read_bytes()?;
        self.ints = reader.read_array()?;
        self.doubles = reader.read_array()?;
        self.names = reader.read_string_array()?;
        self.leaves = reader.read_savable_array()?;
        self.nested = reader.read_savable_as::<Scalars>()?.map(Box::new);
        Ok(())
    }
}

/// Registry with every fixture type.
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register::<Leaf>().unwrap();
    registry.register::<Parent>().unwrap();
    registry.register::<Root>().unwrap();
    registry.register::<Link>().unwrap();
    registry.register::<Bag>().unwrap();
    registry.register::<Holder>().unwrap();
    registry.register::<Scalars>().unwrap();
    registry.register::<Wrapper>().unwrap();
    registry
}

/// Encode one graph into a fresh buffer.
pub fn encode(root: &dyn Savable, config: WriterConfig) -> (Vec<u8>, GraphSummary) {
    let mut out = Vec::new();
    let summary = {
        let mut writer = GraphWriter::with_config(&mut out, config);
        writer.write_root(root).unwrap();
        writer.finish().unwrap().unwrap()
    };
    (out, summary)
}
