use std::path::Path;

use anyhow::*;

use crate::errors::NewickError;

/// A phylogeny read from a .newick file.
#[derive(Clone, PartialEq, Debug)]
pub struct Phylogeny {
    /// The name of the current node.
    ///
    /// Can be empty for internal nodes.
    pub name: String,

    /// Distance to the parent node, if the file carries one.
    pub branch: Option<f32>,

    /// The children of the current node; empty for leaves.
    pub children: Vec<Phylogeny>,
}

impl Phylogeny {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Phylogeny> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("while reading {:?}", path.as_ref()))?;
        Phylogeny::from_string(&content)
    }

    pub fn from_string(text: &str) -> Result<Phylogeny> {
        let mut p = Parser { bytes: text.as_bytes(), pos: 0 };
        let tree = p.clade()?;
        p.skip_blanks();
        if p.next_if(b';').is_none() {
            bail!(NewickError::MissingTerminator);
        }
        p.skip_blanks();
        if p.pos != p.bytes.len() {
            bail!(NewickError::TrailingContent(p.pos));
        }
        Ok(tree)
    }

    /// All leaf names, in tree order.
    pub fn leaf_names(&self) -> Vec<&str> {
        let mut r = Vec::new();
        self.rec_leaf_names(&mut r);
        r
    }

    fn rec_leaf_names<'a>(&'a self, ax: &mut Vec<&'a str>) {
        if self.is_leaf() {
            ax.push(&self.name);
        } else {
            for c in self.children.iter() {
                c.rec_leaf_names(ax);
            }
        }
    }

    /// Return a copy of this tree with every leaf name passed through `f`.
    pub fn map_leaf_names<F>(&self, f: &mut F) -> Result<Phylogeny>
    where
        F: FnMut(&str) -> Result<String>,
    {
        Ok(Phylogeny {
            name: if self.is_leaf() { f(&self.name)? } else { self.name.clone() },
            branch: self.branch,
            children: self
                .children
                .iter()
                .map(|c| c.map_leaf_names(f))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Serialize to Newick text.
    ///
    /// Branch lengths are written in fixed-point notation; Ranger-DTL chokes
    /// on the scientific notation a plain `{}` would produce for short
    /// branches. The root carries neither name nor branch length.
    pub fn to_newick(&self) -> String {
        let mut r = String::new();
        self.write_clade(&mut r, true);
        r.push(';');
        r
    }

    fn write_clade(&self, out: &mut String, root: bool) {
        if !self.is_leaf() {
            out.push('(');
            for (i, c) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                c.write_clade(out, false);
            }
            out.push(')');
        }
        if !root {
            out.push_str(&self.name);
            if let Some(l) = self.branch {
                out.push_str(&format!(":{:.6}", l));
            }
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next_if(&mut self, b: u8) -> Option<u8> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Some(b)
        } else {
            None
        }
    }

    fn skip_blanks(&mut self) {
        while self.peek().map(|b| b.is_ascii_whitespace()).unwrap_or(false) {
            self.pos += 1;
        }
        // bracketed comments (NHX tags and the like) are not our business
        if self.next_if(b'[').is_some() {
            while self.peek().is_some() && self.next_if(b']').is_none() {
                self.pos += 1;
            }
            self.skip_blanks();
        }
    }

    fn clade(&mut self) -> Result<Phylogeny> {
        self.skip_blanks();
        let children = if self.next_if(b'(').is_some() {
            let mut children = vec![self.clade()?];
            while self.next_if(b',').is_some() {
                children.push(self.clade()?);
            }
            if self.next_if(b')').is_none() {
                bail!(NewickError::UnbalancedParentheses(self.pos));
            }
            children
        } else {
            Vec::new()
        };

        let name = self.label();
        let branch = if self.next_if(b':').is_some() { Some(self.branch_length()?) } else { None };
        self.skip_blanks();

        Ok(Phylogeny { name, branch, children })
    }

    fn label(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .map(|b| !matches!(b, b'(' | b')' | b',' | b':' | b';' | b'[') && !b.is_ascii_whitespace())
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn branch_length(&mut self) -> Result<f32> {
        let start = self.pos;
        while self
            .peek()
            .map(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        text.parse::<f32>().map_err(|_| NewickError::InvalidBranchLength(text.to_owned()).into())
    }
}
