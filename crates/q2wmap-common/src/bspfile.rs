// bspfile.rs — in-memory BSP lump store, load and write
//
// The store holds every lump as a growable array in host byte order.
// Loading validates the directory and swaps each record as it is copied out
// of the file buffer; writing swaps copies, so the store itself is never
// touched by an encode.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::Path;

use rayon::prelude::*;

use crate::error::{CapacityError, Error, FormatError, Result};
use crate::qfiles::*;
use crate::vis::VisHeader;

/// Below this many records a lump is decoded sequentially.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

/// Name used in I/O errors for caller-supplied streams.
const STREAM_NAME: &str = "<stream>";

#[derive(Debug, Clone, PartialEq)]
pub struct BspFile {
    pub version: BspVersion,

    pub models: Vec<DModel>,
    pub vertexes: Vec<DVertex>,
    /// Parallel to `vertexes`. Empty for legacy files.
    pub normals: Vec<DNormal>,
    pub planes: Vec<DPlane>,
    pub nodes: Vec<DNode>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub leafs: Vec<DLeaf>,
    pub leaf_faces: Vec<u16>,
    pub leaf_brushes: Vec<u16>,
    /// Signed edge numbers, see `DEdge`.
    pub face_edges: Vec<i32>,
    pub edges: Vec<DEdge>,
    pub brushes: Vec<DBrush>,
    pub brush_sides: Vec<DBrushSide>,
    pub areas: Vec<DArea>,
    pub area_portals: Vec<DAreaPortal>,

    pub lightmap_data: Vec<u8>,
    /// Visibility lump, file byte order. See `vis_header`.
    pub vis_data: Vec<u8>,
    pub entity_string: Vec<u8>,
    pub pop: [u8; POP_SIZE],
}

impl Default for BspFile {
    fn default() -> Self {
        Self {
            version: BspVersion::default(),
            models: Vec::new(),
            vertexes: Vec::new(),
            normals: Vec::new(),
            planes: Vec::new(),
            nodes: Vec::new(),
            texinfo: Vec::new(),
            faces: Vec::new(),
            leafs: Vec::new(),
            leaf_faces: Vec::new(),
            leaf_brushes: Vec::new(),
            face_edges: Vec::new(),
            edges: Vec::new(),
            brushes: Vec::new(),
            brush_sides: Vec::new(),
            areas: Vec::new(),
            area_portals: Vec::new(),
            lightmap_data: Vec::new(),
            vis_data: Vec::new(),
            entity_string: Vec::new(),
            pop: [0; POP_SIZE],
        }
    }
}

/// Record count and size of one lump, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumpSize {
    pub lump: usize,
    pub name: &'static str,
    pub count: usize,
    pub elem_size: usize,
}

impl LumpSize {
    fn of<T>(lump: usize, count: usize) -> Self {
        Self {
            lump,
            name: LUMP_NAMES[lump],
            count,
            elem_size: size_of::<T>(),
        }
    }

    pub fn bytes(&self) -> usize {
        self.count * self.elem_size
    }
}

// ============================================================
// Load
// ============================================================

fn parse_header(data: &[u8]) -> Result<(DHeader, BspVersion), FormatError> {
    let raw = data.get(..DHEADER_SIZE).ok_or(FormatError::TruncatedHeader {
        len: data.len(),
        need: DHEADER_SIZE,
    })?;
    let mut header: DHeader = bytemuck::pod_read_unaligned(raw);
    header.swap();

    if header.ident != IDBSPHEADER {
        return Err(FormatError::BadIdent(header.ident));
    }
    let version =
        BspVersion::from_i32(header.version).ok_or(FormatError::UnsupportedVersion(header.version))?;

    Ok((header, version))
}

/// Byte range of a lump, checked against the file length.
fn lump_range(header: &DHeader, lump: usize, file_len: usize) -> Result<std::ops::Range<usize>, FormatError> {
    let l = header.lumps[lump];
    let oob = || FormatError::LumpOutOfBounds {
        lump: LUMP_NAMES[lump],
        ofs: l.fileofs,
        len: l.filelen,
        file_len,
    };

    let ofs = usize::try_from(l.fileofs).map_err(|_| oob())?;
    let len = usize::try_from(l.filelen).map_err(|_| oob())?;
    let end = ofs.checked_add(len).ok_or_else(oob)?;
    if end > file_len {
        return Err(oob());
    }
    Ok(ofs..end)
}

/// Decode a run of little-endian records into host order.
fn decode_elements<T: LumpElement>(lump: usize, bytes: &[u8], max: usize) -> Result<Vec<T>> {
    let size = size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(FormatError::FunnyLumpSize {
            lump: LUMP_NAMES[lump],
            len: bytes.len(),
            size,
        }
        .into());
    }
    let count = bytes.len() / size;
    CapacityError::check(LUMP_NAMES[lump], count, max)?;

    let decode = |chunk: &[u8]| {
        let mut elem: T = bytemuck::pod_read_unaligned(chunk);
        elem.swap();
        elem
    };
    let elems = if count >= PARALLEL_LUMP_THRESHOLD {
        bytes.par_chunks_exact(size).map(decode).collect()
    } else {
        bytes.chunks_exact(size).map(decode).collect()
    };

    tracing::debug!(lump = LUMP_NAMES[lump], count, "loaded lump");
    Ok(elems)
}

fn copy_lump<T: LumpElement>(data: &[u8], header: &DHeader, lump: usize, max: usize) -> Result<Vec<T>> {
    let range = lump_range(header, lump, data.len())?;
    decode_elements(lump, &data[range], max)
}

fn copy_bytes(data: &[u8], header: &DHeader, lump: usize, max: usize) -> Result<Vec<u8>> {
    let range = lump_range(header, lump, data.len())?;
    CapacityError::check(LUMP_NAMES[lump], range.len(), max)?;
    tracing::debug!(lump = LUMP_NAMES[lump], bytes = range.len(), "loaded lump");
    Ok(data[range].to_vec())
}

impl BspFile {
    pub fn new(version: BspVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Load a BSP file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "loading bsp");
        Self::from_bytes(&data)
    }

    /// Decode a complete BSP file image.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (header, version) = parse_header(data)?;
        let h = &header;

        let mut pop = [0u8; POP_SIZE];
        let pop_bytes = copy_bytes(data, h, LUMP_POP, POP_SIZE)?;
        pop[..pop_bytes.len()].copy_from_slice(&pop_bytes);

        let normals = if version.has_normals() {
            copy_lump(data, h, LUMP_NORMALS, MAX_MAP_NORMALS)?
        } else {
            Vec::new()
        };

        Ok(Self {
            version,
            models: copy_lump(data, h, LUMP_MODELS, MAX_MAP_MODELS)?,
            vertexes: copy_lump(data, h, LUMP_VERTEXES, MAX_MAP_VERTS)?,
            normals,
            planes: copy_lump(data, h, LUMP_PLANES, MAX_MAP_PLANES)?,
            nodes: copy_lump(data, h, LUMP_NODES, MAX_MAP_NODES)?,
            texinfo: copy_lump(data, h, LUMP_TEXINFO, MAX_MAP_TEXINFO)?,
            faces: copy_lump(data, h, LUMP_FACES, MAX_MAP_FACES)?,
            leafs: copy_lump(data, h, LUMP_LEAFS, MAX_MAP_LEAFS)?,
            leaf_faces: copy_lump(data, h, LUMP_LEAFFACES, MAX_MAP_LEAFFACES)?,
            leaf_brushes: copy_lump(data, h, LUMP_LEAFBRUSHES, MAX_MAP_LEAFBRUSHES)?,
            face_edges: copy_lump(data, h, LUMP_SURFEDGES, MAX_MAP_SURFEDGES)?,
            edges: copy_lump(data, h, LUMP_EDGES, MAX_MAP_EDGES)?,
            brushes: copy_lump(data, h, LUMP_BRUSHES, MAX_MAP_BRUSHES)?,
            brush_sides: copy_lump(data, h, LUMP_BRUSHSIDES, MAX_MAP_BRUSHSIDES)?,
            areas: copy_lump(data, h, LUMP_AREAS, MAX_MAP_AREAS)?,
            area_portals: copy_lump(data, h, LUMP_AREAPORTALS, MAX_MAP_AREAPORTALS)?,
            lightmap_data: copy_bytes(data, h, LUMP_LIGHTING, MAX_MAP_LIGHTING)?,
            vis_data: copy_bytes(data, h, LUMP_VISIBILITY, MAX_MAP_VISIBILITY)?,
            entity_string: copy_bytes(data, h, LUMP_ENTITIES, MAX_MAP_ENTSTRING)?,
            pop,
        })
    }

    /// Read only the texinfo lump of a BSP file.
    pub fn load_texinfo(path: impl AsRef<Path>) -> Result<Vec<TexInfo>> {
        let path = path.as_ref();
        let io_err = |e| Error::io(path, e);

        let mut file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len() as usize;

        let mut raw = vec![0u8; DHEADER_SIZE.min(file_len)];
        file.read_exact(&mut raw).map_err(io_err)?;
        let (header, _) = parse_header(&raw)?;

        let range = lump_range(&header, LUMP_TEXINFO, file_len)?;
        let mut bytes = vec![0u8; range.len()];
        file.seek(SeekFrom::Start(range.start as u64)).map_err(io_err)?;
        file.read_exact(&mut bytes).map_err(io_err)?;

        decode_elements(LUMP_TEXINFO, &bytes, MAX_MAP_TEXINFO)
    }

    /// Decoded header of the visibility lump.
    pub fn vis_header(&self) -> Result<VisHeader> {
        VisHeader::parse(&self.vis_data)
    }
}

// ============================================================
// Write
// ============================================================

struct LumpWriter<'a, W> {
    out: &'a mut W,
    header: DHeader,
    pos: usize,
}

impl<W: Write> LumpWriter<'_, W> {
    fn add_lump(&mut self, lump: usize, bytes: &[u8]) -> io::Result<()> {
        self.header.lumps[lump] = Lump {
            fileofs: self.pos as i32,
            filelen: bytes.len() as i32,
        };
        self.out.write_all(bytes)?;

        let pad = (4 - bytes.len() % 4) % 4;
        self.out.write_all(&[0u8; 3][..pad])?;
        self.pos += bytes.len() + pad;
        Ok(())
    }

    fn add_elements<T: LumpElement>(&mut self, lump: usize, elems: &[T]) -> io::Result<()> {
        let to_file_order = |e: &T| {
            let mut e = *e;
            e.swap();
            e
        };
        let swapped: Vec<T> = if elems.len() >= PARALLEL_LUMP_THRESHOLD {
            elems.par_iter().map(to_file_order).collect()
        } else {
            elems.iter().map(to_file_order).collect()
        };
        self.add_lump(lump, bytemuck::cast_slice(&swapped))
    }
}

impl BspFile {
    /// Check every array against its `MAX_MAP_*` ceiling.
    pub fn check_capacities(&self) -> Result<(), CapacityError> {
        let checks = [
            ("models", self.models.len(), MAX_MAP_MODELS),
            ("vertexes", self.vertexes.len(), MAX_MAP_VERTS),
            ("normals", self.normals.len(), MAX_MAP_NORMALS),
            ("planes", self.planes.len(), MAX_MAP_PLANES),
            ("nodes", self.nodes.len(), MAX_MAP_NODES),
            ("texinfo", self.texinfo.len(), MAX_MAP_TEXINFO),
            ("faces", self.faces.len(), MAX_MAP_FACES),
            ("leafs", self.leafs.len(), MAX_MAP_LEAFS),
            ("leaf_faces", self.leaf_faces.len(), MAX_MAP_LEAFFACES),
            ("leaf_brushes", self.leaf_brushes.len(), MAX_MAP_LEAFBRUSHES),
            ("face_edges", self.face_edges.len(), MAX_MAP_SURFEDGES),
            ("edges", self.edges.len(), MAX_MAP_EDGES),
            ("brushes", self.brushes.len(), MAX_MAP_BRUSHES),
            ("brush_sides", self.brush_sides.len(), MAX_MAP_BRUSHSIDES),
            ("areas", self.areas.len(), MAX_MAP_AREAS),
            ("area_portals", self.area_portals.len(), MAX_MAP_AREAPORTALS),
            ("lighting", self.lightmap_data.len(), MAX_MAP_LIGHTING),
            ("visibility", self.vis_data.len(), MAX_MAP_VISIBILITY),
            ("entities", self.entity_string.len(), MAX_MAP_ENTSTRING),
        ];
        for (what, count, max) in checks {
            CapacityError::check(what, count, max)?;
        }
        Ok(())
    }

    fn encode<W: Write + Seek>(&self, out: &mut W) -> io::Result<()> {
        let start = out.stream_position()?;
        out.write_all(bytemuck::bytes_of(&DHeader::default()))?;

        let mut w = LumpWriter {
            out: &mut *out,
            header: DHeader {
                ident: IDBSPHEADER,
                version: self.version.as_i32(),
                lumps: [Lump::default(); HEADER_LUMPS],
            },
            pos: DHEADER_SIZE,
        };

        w.add_elements(LUMP_PLANES, &self.planes)?;
        w.add_elements(LUMP_LEAFS, &self.leafs)?;
        w.add_elements(LUMP_VERTEXES, &self.vertexes)?;
        if self.version.has_normals() {
            if !self.normals.is_empty() && self.normals.len() != self.vertexes.len() {
                tracing::warn!(
                    normals = self.normals.len(),
                    vertexes = self.vertexes.len(),
                    "normal count does not match vertex count"
                );
            }
            w.add_elements(LUMP_NORMALS, &self.normals)?;
        }
        w.add_elements(LUMP_NODES, &self.nodes)?;
        w.add_elements(LUMP_TEXINFO, &self.texinfo)?;
        w.add_elements(LUMP_FACES, &self.faces)?;
        w.add_elements(LUMP_BRUSHES, &self.brushes)?;
        w.add_elements(LUMP_BRUSHSIDES, &self.brush_sides)?;
        w.add_elements(LUMP_LEAFFACES, &self.leaf_faces)?;
        w.add_elements(LUMP_LEAFBRUSHES, &self.leaf_brushes)?;
        w.add_elements(LUMP_SURFEDGES, &self.face_edges)?;
        w.add_elements(LUMP_EDGES, &self.edges)?;
        w.add_elements(LUMP_MODELS, &self.models)?;
        w.add_elements(LUMP_AREAS, &self.areas)?;
        w.add_elements(LUMP_AREAPORTALS, &self.area_portals)?;

        w.add_lump(LUMP_LIGHTING, &self.lightmap_data)?;
        w.add_lump(LUMP_VISIBILITY, &self.vis_data)?;
        w.add_lump(LUMP_ENTITIES, &self.entity_string)?;
        w.add_lump(LUMP_POP, &self.pop)?;

        let end = w.pos as u64;
        let mut header = w.header;
        header.swap();

        out.seek(SeekFrom::Start(start))?;
        out.write_all(bytemuck::bytes_of(&header))?;
        out.seek(SeekFrom::Start(start + end))?;

        tracing::debug!(version = self.version.as_i32(), bytes = end, "wrote bsp");
        Ok(())
    }

    /// Write the store to `path`. The store is left untouched.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.check_capacities()?;

        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.encode(&mut out)
            .and_then(|()| out.flush())
            .map_err(|e| Error::io(path, e))?;

        tracing::info!("wrote {}", path.display());
        Ok(())
    }

    /// Write the store to any seekable stream, starting at its current position.
    pub fn write_to<W: Write + Seek>(&self, out: &mut W) -> Result<()> {
        self.check_capacities()?;
        self.encode(out).map_err(|e| Error::io(STREAM_NAME, e))
    }

    /// Encode the store into a new file image.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = io::Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    // ============================================================
    // Reporting
    // ============================================================

    /// Count and size of every lump, in directory order.
    pub fn lump_sizes(&self) -> Vec<LumpSize> {
        let mut sizes = vec![
            LumpSize::of::<u8>(LUMP_ENTITIES, self.entity_string.len()),
            LumpSize::of::<DPlane>(LUMP_PLANES, self.planes.len()),
            LumpSize::of::<DVertex>(LUMP_VERTEXES, self.vertexes.len()),
            LumpSize::of::<u8>(LUMP_VISIBILITY, self.vis_data.len()),
            LumpSize::of::<DNode>(LUMP_NODES, self.nodes.len()),
            LumpSize::of::<TexInfo>(LUMP_TEXINFO, self.texinfo.len()),
            LumpSize::of::<DFace>(LUMP_FACES, self.faces.len()),
            LumpSize::of::<u8>(LUMP_LIGHTING, self.lightmap_data.len()),
            LumpSize::of::<DLeaf>(LUMP_LEAFS, self.leafs.len()),
            LumpSize::of::<u16>(LUMP_LEAFFACES, self.leaf_faces.len()),
            LumpSize::of::<u16>(LUMP_LEAFBRUSHES, self.leaf_brushes.len()),
            LumpSize::of::<DEdge>(LUMP_EDGES, self.edges.len()),
            LumpSize::of::<i32>(LUMP_SURFEDGES, self.face_edges.len()),
            LumpSize::of::<DModel>(LUMP_MODELS, self.models.len()),
            LumpSize::of::<DBrush>(LUMP_BRUSHES, self.brushes.len()),
            LumpSize::of::<DBrushSide>(LUMP_BRUSHSIDES, self.brush_sides.len()),
            LumpSize::of::<u8>(LUMP_POP, POP_SIZE),
            LumpSize::of::<DArea>(LUMP_AREAS, self.areas.len()),
            LumpSize::of::<DAreaPortal>(LUMP_AREAPORTALS, self.area_portals.len()),
        ];
        if self.version.has_normals() {
            sizes.push(LumpSize::of::<DNormal>(LUMP_NORMALS, self.normals.len()));
        }
        sizes
    }

    /// Log the lump table at info level.
    pub fn print_file_sizes(&self) {
        tracing::info!("version {}", self.version.as_i32());
        for size in self.lump_sizes() {
            tracing::info!("{:>7} {:<14} {:>8}", size.count, size.name, size.bytes());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
