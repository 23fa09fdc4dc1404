use crate::mp4box::*;
use crate::*;

/// Read-only view of one `trak` and its sample tables.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    trak: &'a ContainerBox,
}

const STBL: [BoxType; 3] = [BoxType::MdiaBox, BoxType::MinfBox, BoxType::StblBox];

impl<'a> Track<'a> {
    pub fn new(trak: &'a ContainerBox) -> Result<Self> {
        if trak.box_type != BoxType::TrakBox {
            return Err(Error::InvalidData("not a trak box"));
        }
        Ok(Self { trak })
    }

    pub fn trak(&self) -> &'a ContainerBox {
        self.trak
    }

    pub fn track_id(&self) -> u32 {
        self.tkhd().map(|tkhd| tkhd.track_id).unwrap_or(0)
    }

    pub fn tkhd(&self) -> Option<&'a TkhdBox> {
        self.trak.child(BoxType::TkhdBox).and_then(BoxNode::as_tkhd)
    }

    fn stbl_child(&self, box_type: BoxType) -> Option<&'a BoxNode> {
        let trak: &'a ContainerBox = self.trak;
        let mut path = STBL.to_vec();
        path.push(box_type);
        trak.find(&path)
    }

    pub fn stsz(&self) -> Result<&'a StszBox> {
        self.stbl_child(BoxType::StszBox)
            .and_then(BoxNode::as_stsz)
            .ok_or(Error::BoxInTrakNotFound(self.track_id(), BoxType::StszBox))
    }

    pub fn stsc(&self) -> Result<&'a StscBox> {
        self.stbl_child(BoxType::StscBox)
            .and_then(BoxNode::as_stsc)
            .ok_or(Error::BoxInTrakNotFound(self.track_id(), BoxType::StscBox))
    }

    pub fn sample_count(&self) -> u32 {
        self.stsz().map(|stsz| stsz.sample_count).unwrap_or(0)
    }

    pub fn sample_size(&self, sample_id: u32) -> Result<u32> {
        self.stsz()?.sample_size(sample_id)
    }

    /// Absolute offset of chunk `chunk_id` (1-based), from `stco` or `co64`.
    pub fn chunk_offset(&self, chunk_id: u32) -> Result<u64> {
        let index = chunk_id.checked_sub(1).map(|i| i as usize);
        if let Some(stco) = self.stbl_child(BoxType::StcoBox).and_then(BoxNode::as_stco) {
            return index
                .and_then(|i| stco.entries.get(i))
                .map(|offset| *offset as u64)
                .ok_or(Error::EntryInStblNotFound(
                    self.track_id(),
                    BoxType::StcoBox,
                    chunk_id,
                ));
        }
        if let Some(co64) = self.stbl_child(BoxType::Co64Box).and_then(BoxNode::as_co64) {
            return index
                .and_then(|i| co64.entries.get(i))
                .copied()
                .ok_or(Error::EntryInStblNotFound(
                    self.track_id(),
                    BoxType::Co64Box,
                    chunk_id,
                ));
        }
        Err(Error::BoxInTrakNotFound(self.track_id(), BoxType::StcoBox))
    }

    /// Absolute offset of the 1-based sample `sample_id`.
    pub fn sample_offset(&self, sample_id: u32) -> Result<u64> {
        let stsz = self.stsz()?;
        stsz.sample_size(sample_id)?;
        let (chunk_id, first_sample_in_chunk) = self.stsc()?.chunk_of_sample(sample_id)?;
        let chunk_offset = self.chunk_offset(chunk_id)?;
        if first_sample_in_chunk == sample_id {
            return Ok(chunk_offset);
        }
        offset_add(chunk_offset, stsz.total_size(first_sample_in_chunk, sample_id - 1)?)
    }

    /// Byte runs `(absolute offset, length)` holding samples `start..=end`.
    /// Samples that sit back to back in the file share one run.
    pub fn sample_runs(&self, start: u32, end: u32) -> Result<Vec<(u64, u64)>> {
        if start > end {
            return Err(Error::InvalidSampleRange(start, end));
        }
        let stsz = self.stsz()?;
        let stsc = self.stsc()?;
        stsz.sample_size(start)?;
        stsz.sample_size(end)?;

        let mut runs: Vec<(u64, u64)> = Vec::new();
        let mut sample_id = start;
        while sample_id <= end {
            let (chunk_id, first_sample_in_chunk) = stsc.chunk_of_sample(sample_id)?;
            let entry_end = stsc
                .entries
                .iter()
                .rev()
                .find(|e| e.first_sample <= sample_id)
                .map(|e| {
                    first_sample_in_chunk.saturating_add(e.samples_per_chunk.saturating_sub(1))
                })
                .unwrap_or(sample_id);
            let last = entry_end.min(end);

            let mut offset = self.chunk_offset(chunk_id)?;
            if first_sample_in_chunk < sample_id {
                offset = offset_add(offset, stsz.total_size(first_sample_in_chunk, sample_id - 1)?)?;
            }
            let len = stsz.total_size(sample_id, last)?;
            offset_add(offset, len)?;

            match runs.last_mut() {
                Some((run_offset, run_len)) if *run_offset + *run_len == offset => {
                    *run_len += len;
                }
                _ => runs.push((offset, len)),
            }
            sample_id = match last.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(runs)
    }
}

fn offset_add(offset: u64, len: u64) -> Result<u64> {
    offset
        .checked_add(len)
        .ok_or(Error::InvalidData("sample data runs past the largest file offset"))
}
