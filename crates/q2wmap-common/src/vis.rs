// vis.rs — PVS/PHS run-length codec and visibility lump layout
//
// A compressed row is a stream of either one nonzero byte (copied verbatim)
// or the pair (0x00, run) standing for `run` zero bytes, 1 <= run <= 255.
// There is no terminator: the decoder stops once a full row is produced.
//
// The visibility lump starts with num_clusters (i32) followed by one
// (pvs_offset, phs_offset) pair per cluster, offsets relative to the start
// of the lump. The lump is kept in file order; the header is decoded here.

use rayon::prelude::*;

use crate::error::{CapacityError, FormatError, Result};
use crate::qfiles::{DVIS_PHS, DVIS_PVS, MAX_MAP_VISIBILITY};

/// Longest zero run a single (0x00, run) pair can express.
pub const MAX_VIS_RUN: usize = 0xff;

/// Bytes in one uncompressed row for `num_clusters` clusters.
#[inline]
pub fn vis_row_bytes(num_clusters: usize) -> usize {
    (num_clusters + 7) >> 3
}

// ============================================================
// Row codec
// ============================================================

/// Compress one uncompressed row. The whole slice is the row.
pub fn compress_vis(vis: &[u8]) -> Vec<u8> {
    let mut dest = Vec::with_capacity(vis.len());
    let mut j = 0;

    while j < vis.len() {
        let b = vis[j];
        j += 1;
        dest.push(b);
        if b != 0 {
            continue;
        }

        let mut rep = 1;
        while j < vis.len() && vis[j] == 0 && rep < MAX_VIS_RUN {
            rep += 1;
            j += 1;
        }
        dest.push(rep as u8);
    }

    dest
}

/// Decompress one row into `out`, which must be exactly one row long.
/// Returns the number of compressed bytes consumed.
pub fn decompress_vis_into(input: &[u8], out: &mut [u8]) -> Result<usize, FormatError> {
    let row = out.len();
    let mut inp = 0;
    let mut out_p = 0;

    while out_p < row {
        let Some(&b) = input.get(inp) else {
            return Err(FormatError::VisTruncated { got: out_p, row });
        };
        if b != 0 {
            out[out_p] = b;
            out_p += 1;
            inp += 1;
            continue;
        }

        let Some(&run) = input.get(inp + 1) else {
            return Err(FormatError::VisTruncated { got: out_p, row });
        };
        if run == 0 {
            return Err(FormatError::ZeroRepeat);
        }
        inp += 2;

        let mut c = run as usize;
        if out_p + c > row {
            tracing::warn!(overrun = out_p + c - row, "vis decompression overrun");
            c = row - out_p;
        }
        out[out_p..out_p + c].fill(0);
        out_p += c;
    }

    Ok(inp)
}

/// Decompress one row for a map with `num_clusters` clusters.
pub fn decompress_vis(input: &[u8], num_clusters: usize) -> Result<Vec<u8>, FormatError> {
    let mut out = vec![0u8; vis_row_bytes(num_clusters)];
    decompress_vis_into(input, &mut out)?;
    Ok(out)
}

// ============================================================
// Visibility lump
// ============================================================

/// Decoded header of the visibility lump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisHeader {
    pub num_clusters: usize,
    /// bit_offsets[cluster][DVIS_PVS / DVIS_PHS]
    pub bit_offsets: Vec<[i32; 2]>,
}

fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

impl VisHeader {
    /// Header size in bytes for `num_clusters` clusters.
    pub fn size_for(num_clusters: usize) -> usize {
        4 + num_clusters * 8
    }

    /// Decode the header of a visibility lump. An empty lump means no vis.
    pub fn parse(vis_data: &[u8]) -> Result<Self> {
        if vis_data.is_empty() {
            return Ok(Self::default());
        }
        if vis_data.len() < 4 {
            return Err(FormatError::VisTruncated { got: vis_data.len(), row: 4 }.into());
        }

        let raw_clusters = read_i32_le(vis_data, 0);
        let num_clusters = usize::try_from(raw_clusters).map_err(|_| FormatError::BadIndex {
            what: "cluster count",
            index: raw_clusters as i64,
            count: 0,
        })?;
        let header_len = Self::size_for(num_clusters);
        if header_len > vis_data.len() {
            return Err(FormatError::VisTruncated { got: vis_data.len(), row: header_len }.into());
        }

        let mut bit_offsets = Vec::with_capacity(num_clusters);
        for cluster in 0..num_clusters {
            let base = 4 + cluster * 8;
            let pair = [read_i32_le(vis_data, base), read_i32_le(vis_data, base + 4)];
            for &offset in &pair {
                if offset < 0 || offset as usize >= vis_data.len() {
                    return Err(FormatError::BadVisOffset {
                        cluster,
                        offset,
                        len: vis_data.len(),
                    }
                    .into());
                }
            }
            bit_offsets.push(pair);
        }

        Ok(Self {
            num_clusters,
            bit_offsets,
        })
    }

    pub fn row_bytes(&self) -> usize {
        vis_row_bytes(self.num_clusters)
    }

    fn row(&self, vis_data: &[u8], cluster: usize, which: usize) -> Result<Vec<u8>> {
        let pair = self.bit_offsets.get(cluster).ok_or(FormatError::BadIndex {
            what: "cluster",
            index: cluster as i64,
            count: self.num_clusters,
        })?;
        let offset = pair[which];
        let input = usize::try_from(offset)
            .ok()
            .and_then(|o| vis_data.get(o..))
            .ok_or(FormatError::BadVisOffset {
                cluster,
                offset,
                len: vis_data.len(),
            })?;
        Ok(decompress_vis(input, self.num_clusters)?)
    }

    /// Decompressed potentially-visible set of `cluster`.
    pub fn pvs(&self, vis_data: &[u8], cluster: usize) -> Result<Vec<u8>> {
        self.row(vis_data, cluster, DVIS_PVS)
    }

    /// Decompressed potentially-hearable set of `cluster`.
    pub fn phs(&self, vis_data: &[u8], cluster: usize) -> Result<Vec<u8>> {
        self.row(vis_data, cluster, DVIS_PHS)
    }
}

/// Build a visibility lump from uncompressed PVS and PHS rows, one of each per
/// cluster. Every row must be `vis_row_bytes(num_clusters)` long.
pub fn build_vis_lump(pvs_rows: &[Vec<u8>], phs_rows: &[Vec<u8>]) -> Result<Vec<u8>> {
    let num_clusters = pvs_rows.len();
    if phs_rows.len() != num_clusters {
        return Err(FormatError::BadIndex {
            what: "phs row",
            index: phs_rows.len() as i64,
            count: num_clusters,
        }
        .into());
    }
    let row = vis_row_bytes(num_clusters);
    if let Some(r) = pvs_rows.iter().chain(phs_rows.iter()).find(|r| r.len() != row) {
        return Err(FormatError::VisTruncated { got: r.len(), row }.into());
    }

    let compressed: Vec<(Vec<u8>, Vec<u8>)> = pvs_rows
        .par_iter()
        .zip(phs_rows.par_iter())
        .map(|(pvs, phs)| (compress_vis(pvs), compress_vis(phs)))
        .collect();

    let header_len = VisHeader::size_for(num_clusters);
    let total = header_len
        + compressed
            .iter()
            .map(|(p, h)| p.len() + h.len())
            .sum::<usize>();
    CapacityError::check("visibility", total, MAX_MAP_VISIBILITY)?;

    let mut data = vec![0u8; header_len];
    data[0..4].copy_from_slice(&(num_clusters as i32).to_le_bytes());
    for (cluster, (pvs, phs)) in compressed.iter().enumerate() {
        let base = 4 + cluster * 8;
        let pvs_ofs = data.len() as i32;
        data.extend_from_slice(pvs);
        let phs_ofs = data.len() as i32;
        data.extend_from_slice(phs);
        data[base..base + 4].copy_from_slice(&pvs_ofs.to_le_bytes());
        data[base + 4..base + 8].copy_from_slice(&phs_ofs.to_le_bytes());
    }

    tracing::debug!(num_clusters, bytes = data.len(), "built visibility lump");
    Ok(data)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn row_bytes_rounds_up() {
        assert_eq!(vis_row_bytes(0), 0);
        assert_eq!(vis_row_bytes(1), 1);
        assert_eq!(vis_row_bytes(8), 1);
        assert_eq!(vis_row_bytes(9), 2);
        assert_eq!(vis_row_bytes(40), 5);
    }

    #[test]
    fn compress_known_row() {
        let row = [0xff, 0x00, 0x00, 0x00, 0xab];
        assert_eq!(compress_vis(&row), vec![0xff, 0x00, 0x03, 0xab]);
    }

    #[test]
    fn decompress_known_row() {
        let packed = [0xff, 0x00, 0x03, 0xab];
        // 40 clusters -> 5 byte row
        assert_eq!(
            decompress_vis(&packed, 40).unwrap(),
            vec![0xff, 0x00, 0x00, 0x00, 0xab]
        );
    }

    #[test]
    fn nonzero_row_is_copied_verbatim() {
        let row: Vec<u8> = (1..=32).collect();
        assert_eq!(compress_vis(&row), row);
    }

    #[test]
    fn long_zero_run_splits_at_255() {
        let row = vec![0u8; 300];
        assert_eq!(compress_vis(&row), vec![0x00, 0xff, 0x00, 45]);
        assert_eq!(decompress_vis(&compress_vis(&row), 300 * 8).unwrap(), row);
    }

    #[test]
    fn trailing_zero_run() {
        let row = [0x01, 0x00, 0x00];
        assert_eq!(compress_vis(&row), vec![0x01, 0x00, 0x02]);
    }

    #[test]
    fn zero_repeat_is_an_error() {
        assert_eq!(decompress_vis(&[0x00, 0x00], 16), Err(FormatError::ZeroRepeat));
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert_eq!(
            decompress_vis(&[0xff], 16),
            Err(FormatError::VisTruncated { got: 1, row: 2 })
        );
        assert_eq!(
            decompress_vis(&[0x00], 16),
            Err(FormatError::VisTruncated { got: 0, row: 2 })
        );
    }

    #[test]
    fn overshooting_run_is_clamped() {
        assert_eq!(decompress_vis(&[0x07, 0x00, 0x09], 24).unwrap(), vec![0x07, 0, 0]);
    }

    #[test]
    fn decompress_reports_consumed_bytes() {
        let mut out = [0u8; 2];
        let used = decompress_vis_into(&[0x00, 0x02, 0xee, 0xee], &mut out).unwrap();
        assert_eq!(used, 2);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn random_rows_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5157);
        for _ in 0..200 {
            let len = rng.gen_range(1..700);
            let row: Vec<u8> = (0..len)
                .map(|_| if rng.gen_bool(0.7) { 0 } else { rng.gen() })
                .collect();
            let packed = compress_vis(&row);
            assert_eq!(decompress_vis(&packed, len * 8).unwrap(), row);
        }
    }

    // =========================================================================
    // Visibility lump
    // =========================================================================

    fn sample_rows() -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        // 10 clusters -> 2 byte rows
        let pvs = (0..10u8).map(|c| vec![1 << (c % 8), 0]).collect();
        let phs = (0..10u8).map(|_| vec![0xff, 0x03]).collect();
        (pvs, phs)
    }

    #[test]
    fn vis_lump_round_trip() {
        let (pvs, phs) = sample_rows();
        let data = build_vis_lump(&pvs, &phs).unwrap();
        let header = VisHeader::parse(&data).unwrap();
        assert_eq!(header.num_clusters, 10);
        assert_eq!(header.row_bytes(), 2);
        for cluster in 0..10 {
            assert_eq!(header.pvs(&data, cluster).unwrap(), pvs[cluster]);
            assert_eq!(header.phs(&data, cluster).unwrap(), phs[cluster]);
        }
        assert_eq!(header.bit_offsets[0][DVIS_PVS] as usize, VisHeader::size_for(10));
    }

    #[test]
    fn empty_vis_lump_has_no_clusters() {
        assert_eq!(VisHeader::parse(&[]).unwrap(), VisHeader::default());
    }

    #[test]
    fn vis_header_rejects_bad_offset() {
        let (pvs, phs) = sample_rows();
        let mut data = build_vis_lump(&pvs, &phs).unwrap();
        data[4..8].copy_from_slice(&9999i32.to_le_bytes());
        assert!(matches!(
            VisHeader::parse(&data),
            Err(Error::Format(FormatError::BadVisOffset { cluster: 0, offset: 9999, .. }))
        ));
    }

    #[test]
    fn vis_header_rejects_short_header() {
        let data = 5i32.to_le_bytes();
        assert!(matches!(
            VisHeader::parse(&data),
            Err(Error::Format(FormatError::VisTruncated { .. }))
        ));
    }

    #[test]
    fn unknown_cluster_is_an_error() {
        let (pvs, phs) = sample_rows();
        let data = build_vis_lump(&pvs, &phs).unwrap();
        let header = VisHeader::parse(&data).unwrap();
        assert!(header.pvs(&data, 10).is_err());
    }

    #[test]
    fn build_rejects_mismatched_rows() {
        let (pvs, mut phs) = sample_rows();
        phs.pop();
        assert!(build_vis_lump(&pvs, &phs).is_err());
        let (mut pvs, phs) = sample_rows();
        pvs[3].push(0);
        assert!(build_vis_lump(&pvs, &phs).is_err());
    }
}
