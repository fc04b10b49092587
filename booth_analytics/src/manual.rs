/*!

This is the long-form manual for `booth_analytics` and `boothdash`.

## Input formats

The booth data comes from one spreadsheet per set of assemblies. Two
renditions of it are supported:
* `json` the spreadsheet exported as a single JSON document
* `xlsx` the Excel workbook itself

### `json`

```text
{
  "AC_1_FINAL": [ { "PS_NO_2021": "1", "BJP_2021_pct": 0.4, ... }, ... ],
  "AC_3_FINAL": [ ... ],
  "Sheet2": [ ["1", "Mannadipet"], ["3", "Ossudu"] ]
}
```

Every key of the form `AC_<id>_...` holds the rows of one assembly. The
mapping sheet (`Sheet2` by default) gives the name of each assembly. Its rows
may also be objects with `id` and `name` fields.

### `xlsx`

The same layout, one worksheet per assembly. The first row of an assembly
sheet is the header. Empty cells are treated as missing.

## Columns of a booth row

None of the columns is required.

| Column | Meaning |
|--------|---------|
| `PS_NO_2021` or `PS_NO` | the station number |
| `PS_NAME` | the station name (defaults to the number, then `Station <n>`) |
| `LOCALITY_EXTRACTED` or `LOCALITY` | the locality |
| `Latitude`, `Longitude` | the location; 0 means unknown |
| `TOP_SCORE_CATEGORY` | the category of the booth (`A`, `B`, ...) |
| `TOP_SCORE_PARTY` | the strongest party, possibly with a suffix such as `BJP (A)` |
| `<LABEL>_SCORE` | any score computed upstream |
| `<LABEL>_<YEAR>_pct` | the share of the party `LABEL` in the election `YEAR` |
| `POLLED_<YEAR>` | the votes polled in the booth |
| `VOTERS_<YEAR>` | the voter roll of the booth |

Party labels are never hardcoded: every `<LABEL>_<YEAR>_pct` column is kept.
Numbers may be written as strings.

## Share scale

Shares are stored as fractions. Some exports write percentages instead
(`40` rather than `0.4`). With the `auto` scale, the shares of an election
are read as percentages when one of them is above 1. The scale can also be
forced with `fraction` or `percent`.

## Station ids

Ids are the keys under which stations are stored, so the same booth must get
the same id at every import.
* `naturalKey`: `<assembly>_<station number>`
* `positional`: `<assembly>-<row number>`, which changes when rows are reordered
* `auto`: natural keys for an assembly when every row has a distinct station
  number, positional ids otherwise

## Statistics

The party table of an assembly weights the share of each booth by its votes.
The trend of the political history page is the plain mean of the booth
shares, where a booth without a share counts as zero. The two numbers differ
on purpose and are both reported.

When the booths have no voter roll, the electorate is estimated from the
votes polled and an assumed turnout rate (0.82 by default). It is reported
together with its source, and should not be read as an electoral roll.

*/
