//! Table geometry: byte offsets of table rows within the `#~`/`#-` stream.

use crate::tables::{TableContext, TableId, TablesHeader};

/// Precomputed byte offset, within the tables stream, of the first row of
/// every present table. Built once per run from the header's row-count
/// vector and never mutated: row-count mutation is forbidden by the engine,
/// so these offsets stay valid for the lifetime of a trim.
#[derive(Debug, Clone)]
pub struct TableGeometry {
    /// Byte offset (from the start of the tables stream) of table `t`'s
    /// first row, for every present table; 0 for tables with no rows.
    table_start: [usize; 64],
}

impl TableGeometry {
    /// Build the geometry for a parsed tables header.
    #[must_use]
    pub fn build(header: &TablesHeader, ctx: &TableContext) -> Self {
        let mut table_start = [0usize; 64];
        let mut cursor = header.size();
        for (table, count) in header.tables() {
            table_start[table as usize] = cursor;
            cursor += ctx.row_size(table) * count as usize;
        }
        Self { table_start }
    }

    /// Byte offset of row `row` (1-based) of `table`, relative to the start
    /// of the tables stream. Row 0 is the table's own start (unused by
    /// valid 1-based row references, but convenient for range math).
    #[must_use]
    pub fn row_offset(&self, ctx: &TableContext, table: TableId, row: u32) -> usize {
        let base = self.table_start[table as usize];
        if row == 0 {
            return base;
        }
        base + ctx.row_size(table) * (row as usize - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(valid_tables: &[(TableId, u32)]) -> TablesHeader {
        let mut valid = 0u64;
        let mut row_counts = [0u32; 64];
        for &(t, count) in valid_tables {
            valid |= 1u64 << (t as u8);
            row_counts[t as usize] = count;
        }
        TablesHeader {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved2: 1,
            valid,
            sorted: 0,
            row_counts,
        }
    }

    #[test]
    fn offsets_are_contiguous_in_table_id_order() {
        let header = header_with(&[(TableId::Module, 1), (TableId::TypeDef, 2)]);
        let ctx = header.context();
        let geometry = TableGeometry::build(&header, &ctx);

        let module_size = ctx.row_size(TableId::Module);
        let expected_typedef_start = header.size() + module_size;
        assert_eq!(
            geometry.row_offset(&ctx, TableId::TypeDef, 1),
            expected_typedef_start
        );
        assert_eq!(
            geometry.row_offset(&ctx, TableId::TypeDef, 2),
            expected_typedef_start + ctx.row_size(TableId::TypeDef)
        );
    }
}
