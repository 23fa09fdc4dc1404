use serde::Serialize;
use std::io::{Read, Seek, Write};

use crate::mp4box::*;

/// A box whose payload is nothing but child boxes (moov, trak, moof, ...).
///
/// Children are kept in stream order, including the ones nobody decodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerBox {
    pub box_type: BoxType,
    pub size_field: SizeField,
    pub children: Vec<BoxNode>,
}

impl ContainerBox {
    pub fn new(box_type: BoxType) -> Self {
        Self {
            box_type,
            size_field: SizeField::Compact,
            children: Vec::new(),
        }
    }

    pub fn decode(decoder: &mut BoxDecoder<'_>, header: &BoxHeader) -> Result<Self> {
        let end = decoder.position()? + header.payload_size();
        let children = decoder.decode_children(end)?;
        Ok(ContainerBox {
            box_type: header.name,
            size_field: header.size_field,
            children,
        })
    }

    pub fn get_size(&self) -> u64 {
        let payload: u64 = self.children.iter().map(|c| c.box_size()).sum();
        self.size_field.header_size(payload) + payload
    }

    pub fn push(&mut self, child: BoxNode) {
        self.children.push(child);
    }

    /// First child of `box_type`.
    pub fn child(&self, box_type: BoxType) -> Option<&BoxNode> {
        self.children.iter().find(|c| c.box_type() == box_type)
    }

    pub fn child_mut(&mut self, box_type: BoxType) -> Option<&mut BoxNode> {
        self.children.iter_mut().find(|c| c.box_type() == box_type)
    }

    /// All children of `box_type`, in order.
    pub fn children_of(&self, box_type: BoxType) -> impl Iterator<Item = &BoxNode> {
        self.children
            .iter()
            .filter(move |c| c.box_type() == box_type)
    }

    /// First child container of `box_type`.
    pub fn container(&self, box_type: BoxType) -> Option<&ContainerBox> {
        self.child(box_type).and_then(BoxNode::as_container)
    }

    /// Follows `path` down through nested containers.
    pub fn find(&self, path: &[BoxType]) -> Option<&BoxNode> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for box_type in parents {
            current = current.container(*box_type)?;
        }
        current.child(*last)
    }

    pub fn find_mut(&mut self, path: &[BoxType]) -> Option<&mut BoxNode> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for box_type in parents {
            current = current.child_mut(*box_type)?.as_container_mut()?;
        }
        current.child_mut(*last)
    }

    pub(crate) fn write_box_with_source<W, R>(&self, writer: &mut W, source: &mut R) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek + ?Sized,
    {
        let size = self.box_size();
        BoxHeader::new(self.box_type, size)
            .with_size_field(self.size_field)
            .write(writer)?;
        for child in self.children.iter() {
            child.write_box_with_source(writer, source)?;
        }
        Ok(size)
    }
}

impl Mp4Box for ContainerBox {
    fn box_type(&self) -> BoxType {
        self.box_type
    }

    fn box_size(&self) -> u64 {
        self.get_size()
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self)?)
    }

    fn summary(&self) -> Result<String> {
        let s = format!("children={}", self.children.len());
        Ok(s)
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for ContainerBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type, size)
            .with_size_field(self.size_field)
            .write(writer)?;
        for child in self.children.iter() {
            child.write_box(writer)?;
        }
        Ok(size)
    }
}
