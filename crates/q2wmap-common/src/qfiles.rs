// qfiles.rs — BSP file format structures
//
// Every record here is `#[repr(C)]` and `Pod`, so a lump is a flat array of
// them. Values on disk are little-endian; `LumpElement::swap` converts one
// record between file order and host order (the same operation both ways).

use bytemuck::{Pod, Zeroable};

use crate::q_shared::Vec3;

// ============================================================
// Byte order
// ============================================================

#[inline]
pub fn little_long(l: i32) -> i32 {
    i32::from_le(l)
}

#[inline]
pub fn little_short(s: i16) -> i16 {
    i16::from_le(s)
}

#[inline]
pub fn little_ushort(s: u16) -> u16 {
    u16::from_le(s)
}

#[inline]
pub fn little_float(f: f32) -> f32 {
    f32::from_bits(u32::from_le(f.to_bits()))
}

#[inline]
fn little_vec3(v: &mut Vec3) {
    for x in v.iter_mut() {
        *x = little_float(*x);
    }
}

// ============================================================
// Header
// ============================================================

/// BSP magic: "IBSP" in little-endian
pub const IDBSPHEADER: i32 = (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
/// Quake 2 format.
pub const BSPVERSION: i32 = 38;
/// Extended format: adds per-vertex normals.
pub const BSPVERSION_Q2W: i32 = 69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BspVersion {
    Legacy,
    #[default]
    Extended,
}

impl BspVersion {
    pub fn from_i32(version: i32) -> Option<Self> {
        match version {
            BSPVERSION => Some(BspVersion::Legacy),
            BSPVERSION_Q2W => Some(BspVersion::Extended),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            BspVersion::Legacy => BSPVERSION,
            BspVersion::Extended => BSPVERSION_Q2W,
        }
    }

    pub fn has_normals(self) -> bool {
        self == BspVersion::Extended
    }
}

// Upper design bounds
pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_BRUSHES: usize = 8192;
pub const MAX_MAP_ENTITIES: usize = 2048;
pub const MAX_MAP_ENTSTRING: usize = 0x40000;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_AREAS: usize = 256;
pub const MAX_MAP_AREAPORTALS: usize = 1024;
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_BRUSHSIDES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_VERTS: usize = 65536;
pub const MAX_MAP_NORMALS: usize = MAX_MAP_VERTS;
pub const MAX_MAP_FACES: usize = 65536;
pub const MAX_MAP_LEAFFACES: usize = 65536;
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;
pub const MAX_MAP_EDGES: usize = 128000;
pub const MAX_MAP_SURFEDGES: usize = 256000;
pub const MAX_MAP_LIGHTING: usize = 0x200000;
pub const MAX_MAP_VISIBILITY: usize = 0x100000;

pub const MAX_KEY: usize = 32;
pub const MAX_VALUE: usize = 1024;

/// Size of the legacy "pop" table.
pub const POP_SIZE: usize = 256;

// Lump indices
pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_VISIBILITY: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_LEAFFACES: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const LUMP_POP: usize = 16;
pub const LUMP_AREAS: usize = 17;
pub const LUMP_AREAPORTALS: usize = 18;
pub const LUMP_NORMALS: usize = 19;
pub const HEADER_LUMPS: usize = 20;

pub const LUMP_NAMES: [&str; HEADER_LUMPS] = [
    "entities",
    "planes",
    "vertexes",
    "visibility",
    "nodes",
    "texinfo",
    "faces",
    "lighting",
    "leafs",
    "leaf_faces",
    "leaf_brushes",
    "edges",
    "face_edges",
    "models",
    "brushes",
    "brush_sides",
    "pop",
    "areas",
    "area_portals",
    "normals",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

pub const DHEADER_SIZE: usize = std::mem::size_of::<DHeader>();

impl DHeader {
    /// Swap every 32-bit word of the header.
    pub fn swap(&mut self) {
        self.ident = little_long(self.ident);
        self.version = little_long(self.version);
        for lump in self.lumps.iter_mut() {
            lump.fileofs = little_long(lump.fileofs);
            lump.filelen = little_long(lump.filelen);
        }
    }
}

// ============================================================
// Lump records
// ============================================================

/// A fixed-size record stored in a lump.
pub trait LumpElement: Pod + Send + Sync {
    /// Convert every multi-byte field between file order and host order.
    fn swap(&mut self);
}

impl LumpElement for u16 {
    fn swap(&mut self) {
        *self = little_ushort(*self);
    }
}

impl LumpElement for i32 {
    fn swap(&mut self) {
        *self = little_long(*self);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl LumpElement for DModel {
    fn swap(&mut self) {
        little_vec3(&mut self.mins);
        little_vec3(&mut self.maxs);
        little_vec3(&mut self.origin);
        self.headnode = little_long(self.headnode);
        self.firstface = little_long(self.firstface);
        self.numfaces = little_long(self.numfaces);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DVertex {
    pub point: Vec3,
}

impl LumpElement for DVertex {
    fn swap(&mut self) {
        little_vec3(&mut self.point);
    }
}

/// Per-vertex normal, parallel to the vertex lump (extended format only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DNormal {
    pub normal: Vec3,
}

impl LumpElement for DNormal {
    fn swap(&mut self) {
        little_vec3(&mut self.normal);
    }
}

// Plane types
pub const PLANE_X: i32 = 0;
pub const PLANE_Y: i32 = 1;
pub const PLANE_Z: i32 = 2;
pub const PLANE_ANYX: i32 = 3;
pub const PLANE_ANYY: i32 = 4;
pub const PLANE_ANYZ: i32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

impl LumpElement for DPlane {
    fn swap(&mut self) {
        little_vec3(&mut self.normal);
        self.dist = little_float(self.dist);
        self.plane_type = little_long(self.plane_type);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DNode {
    pub planenum: i32,
    pub children: [i32; 2], // negative numbers are -(leafs+1)
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl LumpElement for DNode {
    fn swap(&mut self) {
        self.planenum = little_long(self.planenum);
        self.children[0] = little_long(self.children[0]);
        self.children[1] = little_long(self.children[1]);
        for j in 0..3 {
            self.mins[j] = little_short(self.mins[j]);
            self.maxs[j] = little_short(self.maxs[j]);
        }
        self.firstface = little_ushort(self.firstface);
        self.numfaces = little_ushort(self.numfaces);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2], // [s/t][xyz offset]
    pub flags: i32,
    pub value: i32,
    pub texture: [u8; 32],
    pub nexttexinfo: i32, // for animations, -1 = end of chain
}

impl TexInfo {
    /// Texture name up to the first NUL.
    pub fn texture_name(&self) -> String {
        let len = self.texture.iter().position(|&b| b == 0).unwrap_or(self.texture.len());
        String::from_utf8_lossy(&self.texture[..len]).into_owned()
    }
}

impl LumpElement for TexInfo {
    fn swap(&mut self) {
        for v in self.vecs.iter_mut().flatten() {
            *v = little_float(*v);
        }
        self.flags = little_long(self.flags);
        self.value = little_long(self.value);
        self.nexttexinfo = little_long(self.nexttexinfo);
    }
}

/// Edge vertex indexes. Edge 0 is never used: negative face-edge numbers
/// mean the edge is walked from v[1] to v[0].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DEdge {
    pub v: [u16; 2],
}

impl LumpElement for DEdge {
    fn swap(&mut self) {
        self.v[0] = little_ushort(self.v[0]);
        self.v[1] = little_ushort(self.v[1]);
    }
}

pub const MAXLIGHTMAPS: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32, // we must support > 64k edges
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    pub lightofs: i32, // start of [numstyles*surfsize] samples
}

impl LumpElement for DFace {
    fn swap(&mut self) {
        self.planenum = little_ushort(self.planenum);
        self.side = little_short(self.side);
        self.firstedge = little_long(self.firstedge);
        self.numedges = little_short(self.numedges);
        self.texinfo = little_short(self.texinfo);
        self.lightofs = little_long(self.lightofs);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
}

impl LumpElement for DLeaf {
    fn swap(&mut self) {
        self.contents = little_long(self.contents);
        self.cluster = little_short(self.cluster);
        self.area = little_short(self.area);
        for j in 0..3 {
            self.mins[j] = little_short(self.mins[j]);
            self.maxs[j] = little_short(self.maxs[j]);
        }
        self.firstleafface = little_ushort(self.firstleafface);
        self.numleaffaces = little_ushort(self.numleaffaces);
        self.firstleafbrush = little_ushort(self.firstleafbrush);
        self.numleafbrushes = little_ushort(self.numleafbrushes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DBrushSide {
    pub planenum: u16, // facing out of the leaf
    pub texinfo: i16,
}

impl LumpElement for DBrushSide {
    fn swap(&mut self) {
        self.planenum = little_ushort(self.planenum);
        self.texinfo = little_short(self.texinfo);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DBrush {
    pub firstside: i32,
    pub numsides: i32,
    pub contents: i32,
}

impl LumpElement for DBrush {
    fn swap(&mut self) {
        self.firstside = little_long(self.firstside);
        self.numsides = little_long(self.numsides);
        self.contents = little_long(self.contents);
    }
}

// Visibility: offsets into the vis lump, one pair per cluster
pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

/// Each area has a list of portals that lead into other areas.
/// When portals are closed, other areas may not be visible or
/// hearable even if the vis info says that it should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DAreaPortal {
    pub portalnum: i32,
    pub otherarea: i32,
}

impl LumpElement for DAreaPortal {
    fn swap(&mut self) {
        self.portalnum = little_long(self.portalnum);
        self.otherarea = little_long(self.otherarea);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DArea {
    pub numareaportals: i32,
    pub firstareaportal: i32,
}

impl LumpElement for DArea {
    fn swap(&mut self) {
        self.numareaportals = little_long(self.numareaportals);
        self.firstareaportal = little_long(self.firstareaportal);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    // =========================================================================
    // Struct size verification — binary-layout-critical structs
    // =========================================================================

    #[test]
    fn size_of_dheader() {
        // ident(4) + version(4) + 20 * Lump(8) = 8 + 160 = 168
        assert_eq!(size_of::<DHeader>(), 8 + HEADER_LUMPS * size_of::<Lump>());
        assert_eq!(DHEADER_SIZE, 168);
    }

    #[test]
    fn size_of_lump() {
        assert_eq!(size_of::<Lump>(), 8);
    }

    #[test]
    fn size_of_dface() {
        // planenum(2) + side(2) + firstedge(4) + numedges(2) + texinfo(2) + styles(4) + lightofs(4) = 20
        assert_eq!(size_of::<DFace>(), 20);
    }

    #[test]
    fn size_of_dnode() {
        // planenum(4) + children(8) + mins(6) + maxs(6) + firstface(2) + numfaces(2) = 28
        assert_eq!(size_of::<DNode>(), 28);
    }

    #[test]
    fn size_of_dleaf() {
        assert_eq!(size_of::<DLeaf>(), 28);
    }

    #[test]
    fn size_of_small_records() {
        assert_eq!(size_of::<DEdge>(), 4);
        assert_eq!(size_of::<DBrushSide>(), 4);
        assert_eq!(size_of::<DArea>(), 8);
        assert_eq!(size_of::<DAreaPortal>(), 8);
        assert_eq!(size_of::<DBrush>(), 12);
        assert_eq!(size_of::<DVertex>(), 12);
        assert_eq!(size_of::<DNormal>(), 12);
    }

    #[test]
    fn size_of_dplane() {
        // normal(12) + dist(4) + plane_type(4) = 20
        assert_eq!(size_of::<DPlane>(), 20);
    }

    #[test]
    fn size_of_dmodel() {
        // mins(12) + maxs(12) + origin(12) + headnode(4) + firstface(4) + numfaces(4) = 48
        assert_eq!(size_of::<DModel>(), 48);
    }

    #[test]
    fn size_of_texinfo() {
        // vecs(32) + flags(4) + value(4) + texture(32) + nexttexinfo(4) = 76
        assert_eq!(size_of::<TexInfo>(), 76);
    }

    // =========================================================================
    // Magic and version
    // =========================================================================

    #[test]
    fn bsp_header_magic() {
        let bytes = IDBSPHEADER.to_le_bytes();
        assert_eq!(&bytes, b"IBSP");
    }

    #[test]
    fn versions_round_trip() {
        assert_eq!(BspVersion::from_i32(38), Some(BspVersion::Legacy));
        assert_eq!(BspVersion::from_i32(69), Some(BspVersion::Extended));
        assert_eq!(BspVersion::from_i32(46), None);
        assert_eq!(BspVersion::Legacy.as_i32(), BSPVERSION);
        assert!(!BspVersion::Legacy.has_normals());
        assert!(BspVersion::Extended.has_normals());
    }

    #[test]
    fn lump_names_cover_directory() {
        assert_eq!(LUMP_NAMES[LUMP_NORMALS], "normals");
        assert_eq!(LUMP_NAMES[LUMP_POP], "pop");
        assert_eq!(LUMP_NAMES.len(), HEADER_LUMPS);
    }

    // =========================================================================
    // Byte order
    // =========================================================================

    #[test]
    fn swap_reads_little_endian_bytes() {
        let raw: [u8; 20] = [
            0x00, 0x00, 0x80, 0x3f, // 1.0
            0x00, 0x00, 0x00, 0x00, // 0.0
            0x00, 0x00, 0x00, 0xc0, // -2.0
            0x00, 0x00, 0x80, 0x42, // 64.0
            0x05, 0x00, 0x00, 0x00, // 5
        ];
        let mut plane: DPlane = bytemuck::pod_read_unaligned(&raw);
        plane.swap();
        assert_eq!(plane.normal, [1.0, 0.0, -2.0]);
        assert_eq!(plane.dist, 64.0);
        assert_eq!(plane.plane_type, PLANE_ANYZ);
    }

    #[test]
    fn swap_twice_is_identity() {
        let mut leaf = DLeaf {
            contents: 1,
            cluster: -1,
            area: 3,
            mins: [-64, -32, 0],
            maxs: [64, 32, 128],
            firstleafface: 7,
            numleaffaces: 2,
            firstleafbrush: 9,
            numleafbrushes: 1,
        };
        let before = leaf;
        leaf.swap();
        leaf.swap();
        assert_eq!(leaf, before);
    }

    #[test]
    fn texinfo_name_stops_at_nul() {
        let mut tex = TexInfo::default();
        tex.texture[..9].copy_from_slice(b"e1u1/floo");
        assert_eq!(tex.texture_name(), "e1u1/floo");
    }
}
