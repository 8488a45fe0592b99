//! Decides from the two page headers alone which page is authoritative and what `init` has to do
//! to get back to a consistent pair. Nothing is cached between calls, so the result after a power
//! loss is the same as if the store had never been used before.

use crate::Store;
use crate::error::Error;
use crate::page::{PageId, PageState};
use crate::platform::Platform;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Where the next record goes.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum WriteTarget {
    /// Steady state, the valid page accepts records until it is full.
    Page(PageId),

    /// A transfer from `source` into `target` was interrupted. New writes are merged into it.
    Transfer { source: PageId, target: PageId },
}

/// Classification of the header pair.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum PagePair {
    /// {Valid, Erased}
    Active(PageId),

    /// {Valid, Receiving}
    Transfer { source: PageId, target: PageId },

    /// {Valid, Corrupt}: erasing the other page was cut short. The valid page was only promoted
    /// after its partner had been retired, so it still holds every value.
    PartiallyErased { valid: PageId },

    /// {Receiving, Erased | Corrupt}: the source page was already being erased, the target holds
    /// every value and just has to be promoted.
    Erasing { target: PageId },

    /// Anything else can't be resolved without guessing.
    Corrupt,
}

impl PagePair {
    pub(crate) fn classify(states: [PageState; 2]) -> Self {
        use PageState::*;

        for page in PageId::ALL {
            let own = states[page.index()];
            let other = states[page.other().index()];
            match (own, other) {
                (Valid, Erased) => return PagePair::Active(page),
                (Valid, Receiving) => {
                    return PagePair::Transfer {
                        source: page,
                        target: page.other(),
                    };
                }
                (Valid, Corrupt) => return PagePair::PartiallyErased { valid: page },
                (Receiving, Erased | Corrupt) => return PagePair::Erasing { target: page },
                _ => {}
            }
        }

        PagePair::Corrupt
    }
}

impl<T: Platform> Store<'_, T> {
    pub(crate) fn inspect_pages(&mut self) -> Result<PagePair, Error> {
        let states = [
            self.page_state(PageId::Page0)?,
            self.page_state(PageId::Page1)?,
        ];

        #[cfg(feature = "defmt")]
        trace!("inspect_pages: [{}, {}]", states[0], states[1]);

        #[cfg(feature = "debug-logs")]
        println!("  resolver: page states: [{}, {}]", states[0], states[1]);

        Ok(PagePair::classify(states))
    }

    /// Exactly one page has to be valid to be read from. A receiving page is ignored until the
    /// transfer is complete.
    pub(crate) fn resolve_for_read(&mut self) -> Result<PageId, Error> {
        let page0 = self.page_state(PageId::Page0)?;
        let page1 = self.page_state(PageId::Page1)?;
        match (page0, page1) {
            (PageState::Valid, PageState::Valid) => Err(Error::NoValidPage),
            (PageState::Valid, _) => Ok(PageId::Page0),
            (_, PageState::Valid) => Ok(PageId::Page1),
            _ => Err(Error::NoValidPage),
        }
    }

    pub(crate) fn resolve_for_write(&mut self) -> Result<WriteTarget, Error> {
        match self.inspect_pages()? {
            PagePair::Active(page) | PagePair::PartiallyErased { valid: page } => {
                Ok(WriteTarget::Page(page))
            }
            PagePair::Transfer { source, target } => Ok(WriteTarget::Transfer { source, target }),
            PagePair::Erasing { .. } | PagePair::Corrupt => Err(Error::NoValidPage),
        }
    }

    /// Brings the header pair back to {Valid, Erased}. Does nothing if it is already there.
    pub(crate) fn recover(&mut self) -> Result<(), Error> {
        match self.inspect_pages()? {
            PagePair::Active(_) => Ok(()),
            PagePair::Transfer { source, target } => {
                #[cfg(feature = "defmt")]
                warn!("resuming transfer {} -> {}", source, target);

                self.transfer(source, target, None)
            }
            PagePair::PartiallyErased { valid } => {
                #[cfg(feature = "defmt")]
                warn!("finishing erase of {}", valid.other());

                self.erase_page(valid.other())
            }
            PagePair::Erasing { target } => {
                #[cfg(feature = "defmt")]
                warn!("finishing transfer into {}", target);

                let source = target.other();
                if !self.is_blank(source)? {
                    self.erase_page(source)?;
                }
                self.mark_as_valid(target)
            }
            PagePair::Corrupt => {
                #[cfg(feature = "defmt")]
                warn!("no consistent page pair, formatting");

                self.format()
            }
        }
    }

    /// Erases both pages and marks Page-0 as valid. Pages which are blank already are skipped.
    pub(crate) fn format(&mut self) -> Result<(), Error> {
        #[cfg(feature = "debug-logs")]
        println!("  resolver: format");

        for page in PageId::ALL {
            if !self.is_blank(page)? {
                self.erase_page(page)?;
            }
        }
        self.mark_as_valid(PageId::Page0)
    }
}
