//! CSV codec for the dense tile-id grid embedded in a layer's `<data>`.

use crate::error::TileError;

/// Render `ids` as `height` comma-joined rows of decimals.
///
/// Rows are joined by `",\n"` and the whole block is wrapped in a leading
/// and trailing newline. [`decode_grid`] strips everything but digits and
/// commas, so this exact framing round-trips.
///
/// # Panics
///
/// Panics if `ids` holds fewer than `width * height` entries.
pub fn encode_grid(width: i32, height: i32, ids: &[u32]) -> String {
    let w = width.max(0) as usize;
    let h = height.max(0) as usize;

    let mut rows = Vec::with_capacity(h);
    for row in 0..h {
        let cells: Vec<String> = ids[row * w..row * w + w]
            .iter()
            .map(|id| id.to_string())
            .collect();
        rows.push(cells.join(","));
    }

    format!("\n{}\n", rows.join(",\n"))
}

/// Parse csv-encoded tile data back into a flat id array.
///
/// Every character that is not an ASCII digit or comma is stripped before
/// splitting, so whitespace and row framing are irrelevant. The result
/// length is not validated against any particular grid size; that is the
/// caller's concern.
pub fn decode_grid(text: &str) -> Result<Vec<u32>, TileError> {
    let clean: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .collect();

    clean
        .split(',')
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| TileError::MalformedGrid(tok.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_framing() {
        // two rows "1,0" and "2,3", comma-newline row join, newline wrapped
        assert_eq!(encode_grid(2, 2, &[1, 0, 2, 3]), "\n1,0,\n2,3\n");
    }

    #[test]
    fn test_decode_inverse() {
        let ids = vec![1, 0, 2, 3];
        assert_eq!(decode_grid(&encode_grid(2, 2, &ids)).unwrap(), ids);

        let wide: Vec<u32> = (0..30).collect();
        assert_eq!(decode_grid(&encode_grid(6, 5, &wide)).unwrap(), wide);
    }

    #[test]
    fn test_decode_strips_noise() {
        let ids = decode_grid(" 1, 2,\r\n3 ,4\t").unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_rejects_bad_token() {
        // stripping leaves an empty token between the two commas
        assert!(matches!(
            decode_grid("1,,2"),
            Err(TileError::MalformedGrid(_))
        ));
    }

    #[test]
    fn test_single_row() {
        assert_eq!(encode_grid(3, 1, &[4, 5, 6]), "\n4,5,6\n");
        assert_eq!(decode_grid("\n4,5,6\n").unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_all_empty_cells() {
        let ids = vec![0; 9];
        assert_eq!(decode_grid(&encode_grid(3, 3, &ids)).unwrap(), ids);
    }
}
