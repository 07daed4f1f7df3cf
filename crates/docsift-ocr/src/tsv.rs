//! Parser for tesseract's TSV output mode.
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num,
//! left, top, width, height, conf, text. Level 1 is the page record
//! (its box is the image size), level 5 the word records.

use docsift_core::{BoundingBox, OcrEngineError, OcrOutput, OcrWord};

const LEVEL_PAGE: u32 = 1;
const LEVEL_WORD: u32 = 5;

pub fn parse_tsv(tsv: &str) -> Result<OcrOutput, OcrEngineError> {
    let mut output = OcrOutput::default();
    let mut saw_page = false;

    for (line_no, line) in tsv.lines().enumerate() {
        if line_no == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            return Err(OcrEngineError::Parse(format!(
                "line {}: expected 12 columns, got {}",
                line_no + 1,
                cols.len()
            )));
        }

        let level: u32 = parse_col(cols[0], line_no, "level")?;
        match level {
            LEVEL_PAGE => {
                output.width = parse_col::<f32>(cols[8], line_no, "width")?;
                output.height = parse_col::<f32>(cols[9], line_no, "height")?;
                saw_page = true;
            }
            LEVEL_WORD => {
                let conf: f32 = parse_col(cols[10], line_no, "conf")?;
                // conf -1 marks structural records misreported as words.
                if conf < 0.0 {
                    continue;
                }
                // Text is the last column and may itself contain no tabs;
                // join defensively in case of stray extra columns.
                let text = cols[11..].join("\t");
                if text.trim().is_empty() {
                    continue;
                }
                let left: f32 = parse_col(cols[6], line_no, "left")?;
                let top: f32 = parse_col(cols[7], line_no, "top")?;
                let width: f32 = parse_col(cols[8], line_no, "width")?;
                let height: f32 = parse_col(cols[9], line_no, "height")?;
                output.words.push(OcrWord {
                    text: text.trim().to_string(),
                    bbox: BoundingBox {
                        x0: left,
                        y0: top,
                        x1: left + width,
                        y1: top + height,
                    },
                    confidence: conf / 100.0,
                });
            }
            _ => {}
        }
    }

    if !saw_page {
        return Err(OcrEngineError::Parse("no page record in TSV output".into()));
    }
    Ok(output)
}

fn parse_col<T: std::str::FromStr>(
    value: &str,
    line_no: usize,
    name: &str,
) -> Result<T, OcrEngineError> {
    value.trim().parse().map_err(|_| {
        OcrEngineError::Parse(format!("line {}: bad {} value {:?}", line_no + 1, name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn page_record_sets_dimensions() {
        let input = tsv(&["1\t1\t0\t0\t0\t0\t0\t0\t1275\t1650\t-1\t"]);
        let output = parse_tsv(&input).unwrap();
        assert_eq!(output.width, 1275.0);
        assert_eq!(output.height, 1650.0);
        assert!(output.words.is_empty());
    }

    #[test]
    fn word_records_become_words_with_scaled_confidence() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1275\t1650\t-1\t",
            "5\t1\t1\t1\t1\t1\t100\t200\t80\t20\t96\tInvoice",
            "5\t1\t1\t1\t1\t2\t190\t200\t90\t20\t91\tINV-001",
        ]);
        let output = parse_tsv(&input).unwrap();
        assert_eq!(output.words.len(), 2);
        let w = &output.words[0];
        assert_eq!(w.text, "Invoice");
        assert_eq!(w.bbox.x0, 100.0);
        assert_eq!(w.bbox.x1, 180.0);
        assert_eq!(w.bbox.y1, 220.0);
        assert!((w.confidence - 0.96).abs() < 1e-6);
    }

    #[test]
    fn negative_confidence_and_blank_words_are_dropped() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1275\t1650\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t5\t5\t-1\t",
            "5\t1\t1\t1\t1\t2\t10\t10\t5\t5\t80\t   ",
            "5\t1\t1\t1\t1\t3\t10\t10\t5\t5\t80\treal",
        ]);
        let output = parse_tsv(&input).unwrap();
        assert_eq!(output.words.len(), 1);
        assert_eq!(output.words[0].text, "real");
    }

    #[test]
    fn intermediate_levels_are_ignored() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t1275\t1650\t-1\t",
            "2\t1\t1\t0\t0\t0\t50\t50\t500\t500\t-1\t",
            "3\t1\t1\t1\t0\t0\t50\t50\t500\t100\t-1\t",
            "4\t1\t1\t1\t1\t0\t50\t50\t500\t20\t-1\t",
        ]);
        let output = parse_tsv(&input).unwrap();
        assert!(output.words.is_empty());
    }

    #[test]
    fn missing_page_record_is_a_parse_error() {
        let input = tsv(&["5\t1\t1\t1\t1\t1\t10\t10\t5\t5\t80\tword"]);
        assert!(matches!(
            parse_tsv(&input),
            Err(OcrEngineError::Parse(_))
        ));
    }

    #[test]
    fn short_rows_are_a_parse_error() {
        let input = tsv(&["5\t1\t1"]);
        assert!(matches!(parse_tsv(&input), Err(OcrEngineError::Parse(_))));
    }
}
