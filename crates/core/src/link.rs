//! Link action resolution.
//!
//! Maps a link annotation's action descriptor to either an absolute
//! page/x/y record or an external URL. Unresolvable actions yield
//! `None` and the link is silently skipped, never an error.

use crate::event::{DestResolver, DestView, ExplicitDest, LinkAction, PageTarget};
use crate::geom::{Matrix, apply_matrix_pt};

/// A link ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedLink {
    /// Intra-document target: zero-based page index and top-left
    /// device coordinates on that page.
    Page { page0: i32, x: i32, y: i32 },
    /// External target.
    Url(String),
}

/// Resolves an action against the document's destination tables.
///
/// Destination coordinates are projected through `page_ctm`, the
/// transform of the page the link sits on. When the destination lies
/// on a different page this is a known approximation; for documents
/// with uniformly sized pages the result is identical.
pub fn resolve_action<R: DestResolver>(
    action: &LinkAction,
    page_ctm: Matrix,
    dests: &R,
) -> Option<ResolvedLink> {
    match action {
        LinkAction::Uri(url) => Some(ResolvedLink::Url(url.clone())),
        LinkAction::Goto(dest) => resolve_dest(dest, page_ctm, dests),
        LinkAction::GotoNamed(name) => {
            // The destination object obtained from the name table is
            // local to this call; nothing of it is retained.
            let dest = dests.named_destination(name)?;
            resolve_dest(&dest, page_ctm, dests)
        }
        LinkAction::RemoteFile | LinkAction::Unknown => None,
    }
}

fn resolve_dest<R: DestResolver>(
    dest: &ExplicitDest,
    page_ctm: Matrix,
    dests: &R,
) -> Option<ResolvedLink> {
    let page = match dest.page {
        PageTarget::Number(n) => n,
        PageTarget::Object(id) => dests.resolve_page_object(id)?,
    };
    if page == 0 {
        return None;
    }

    match dest.view {
        DestView::Xyz {
            left: Some(left),
            top: Some(top),
        } => {
            let (x, y) = apply_matrix_pt(page_ctm, left, top);
            Some(ResolvedLink::Page {
                page0: page as i32 - 1,
                x: x.round() as i32,
                y: y.round() as i32,
            })
        }
        // A destination that keeps left or top unchanged gives us no
        // usable location.
        DestView::Xyz { .. } => None,
        // Fit variants carry no in-page location at all.
        DestView::Fit => Some(ResolvedLink::Page {
            page0: page as i32 - 1,
            x: 0,
            y: 0,
        }),
    }
}
